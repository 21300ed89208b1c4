#![forbid(unsafe_code)]

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use stencil_api::{Function, RunFunctionRequest, Verbatim};
use stencil_compose::Reconciler;
use stencil_manifest::{decode_all, DecodeLimits};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "stencilctl", version, about = "Stencil CLI: decode rendered manifests and run the compose function")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Yaml)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Yaml, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode a multi-document manifest stream and print each document
    Decode {
        /// Manifest file, or "-" for stdin
        file: PathBuf,
    },
    /// Run the function against a RunFunctionRequest (YAML or JSON)
    Run {
        /// Request file, or "-" for stdin
        #[arg(long = "request")]
        request: PathBuf,
        /// Pre-rendered manifests to reconcile instead of the request's input
        #[arg(long = "manifests")]
        manifests: Option<PathBuf>,
    },
}

fn init_tracing() {
    let env = std::env::var("STENCIL_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("STENCIL_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid STENCIL_METRICS_ADDR; expected host:port");
        }
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf).context("reading stdin")?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn render<T: Serialize>(value: &T, output: Output) -> Result<String> {
    Ok(match output {
        Output::Yaml => serde_yaml::to_string(value)?,
        Output::Json => serde_json::to_string_pretty(value)? + "\n",
    })
}

fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { file } => {
            let bytes = read_input(&file)?;
            let docs = decode_all(&bytes, DecodeLimits::from_env()).with_context(|| format!("decoding {}", file.display()))?;
            info!(documents = docs.len(), "decode finished");
            match cli.output {
                Output::Yaml => {
                    for (i, doc) in docs.iter().enumerate() {
                        if i > 0 {
                            println!("---");
                        }
                        print!("{}", render(doc, Output::Yaml)?);
                    }
                }
                Output::Json => print!("{}", render(&docs, Output::Json)?),
            }
        }
        Commands::Run { request, manifests } => {
            let raw = read_input(&request)?;
            // serde_yaml reads JSON requests as well
            let req: RunFunctionRequest = serde_yaml::from_slice(&raw).with_context(|| format!("parsing request {}", request.display()))?;
            let function = Function::new(Verbatim, Reconciler::from_env());
            let rsp = match manifests {
                Some(path) => function.run_rendered(&req, &read_input(&path)?),
                None => function.run_function(&req),
            };
            print!("{}", render(&rsp, cli.output)?);
            if rsp.is_fatal() {
                std::io::stdout().flush()?;
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn cli_definition_is_valid() { Cli::command().debug_assert(); }

    #[test]
    fn run_args_parse() {
        let cli = Cli::try_parse_from(["stencilctl", "-o", "json", "run", "--request", "req.yaml", "--manifests", "-"]).unwrap();
        assert_eq!(cli.output, Output::Json);
        match cli.command {
            Commands::Run { request, manifests } => {
                assert_eq!(request, PathBuf::from("req.yaml"));
                assert_eq!(manifests, Some(PathBuf::from("-")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn engine_metrics_reach_the_prometheus_recorder() {
        let handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder().unwrap();
        let mut xr = stencil_core::CompositeResource::default();
        let mut composed = stencil_core::ComposedResources::new();
        Reconciler::default().reconcile(b"", &mut xr, &mut composed).unwrap();
        let text = handle.render();
        assert!(text.contains("compose_pass_ok"), "rendered={}", text);
    }

    #[test]
    fn render_formats() {
        let v = json!({ "kind": "XApp" });
        assert_eq!(render(&v, Output::Yaml).unwrap(), "kind: XApp\n");
        assert_eq!(render(&v, Output::Json).unwrap(), "{\n  \"kind\": \"XApp\"\n}\n");
    }
}
