use std::time::Duration;

use anyhow::{Context, Result};
use metrics::counter;
use serde_json::Value;
use stencil_compose::{PassSummary, Reconciler};
use tracing::{debug, info, warn};

use crate::input::{template_source, Input};
use crate::render::Renderer;
use crate::{RunFunctionRequest, RunFunctionResponse};

/// How long the caller may cache a response.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

const ERR_CANNOT_GET_INPUT: &str = "invalid function input: cannot get the function input";

/// The request as a generic mapping, used as the template data context.
pub fn request_context(req: &RunFunctionRequest) -> Result<Value> {
    let v = serde_json::to_value(req).context("cannot marshal request to JSON")?;
    anyhow::ensure!(v.is_object(), "request did not serialize to a mapping");
    Ok(v)
}

/// Renders the function's templates and reconciles the result into the
/// desired state of the response.
#[derive(Debug, Clone, Default)]
pub struct Function<R> {
    renderer: R,
    reconciler: Reconciler,
}

impl<R: Renderer> Function<R> {
    pub fn new(renderer: R, reconciler: Reconciler) -> Self { Self { renderer, reconciler } }

    /// Never fails: problems are reported as a fatal result on the response,
    /// whose desired state is then the request's, unchanged.
    pub fn run_function(&self, req: &RunFunctionRequest) -> RunFunctionResponse {
        counter!("function_runs_total", 1u64);
        info!(tag = %req.meta.tag, "running function");
        let mut rsp = RunFunctionResponse::to(req, DEFAULT_TTL);
        match self.render_and_apply(req, &mut rsp) {
            Ok(source) => rsp.normal(format!("I was run with source {:?}", source)),
            Err(e) => fail(&mut rsp, e),
        }
        rsp
    }

    /// Like [`Function::run_function`] for manifests rendered elsewhere; the
    /// request's input is ignored.
    pub fn run_rendered(&self, req: &RunFunctionRequest, rendered: &[u8]) -> RunFunctionResponse {
        counter!("function_runs_total", 1u64);
        info!(tag = %req.meta.tag, bytes = rendered.len(), "running function on pre-rendered manifests");
        let mut rsp = RunFunctionResponse::to(req, DEFAULT_TTL);
        if let Err(e) = self.apply(req, rendered, &mut rsp) {
            fail(&mut rsp, e);
        }
        rsp
    }

    fn render_and_apply(&self, req: &RunFunctionRequest, rsp: &mut RunFunctionResponse) -> Result<&'static str> {
        let input = Input::from_request(req).context("cannot get Function input from request")?;
        let templates = template_source(&input)
            .and_then(|src| src.templates())
            .context(ERR_CANNOT_GET_INPUT)?;
        let ctx = request_context(req).context("cannot convert request to map")?;
        debug!(request = %ctx, "constructed request map");

        let rendered = self.renderer.render(&templates, &ctx).context("cannot execute template")?;
        debug!(manifests = %String::from_utf8_lossy(&rendered), "rendered manifests");

        self.apply(req, &rendered, rsp)?;
        Ok(input.source.as_str())
    }

    fn apply(&self, req: &RunFunctionRequest, rendered: &[u8], rsp: &mut RunFunctionResponse) -> Result<PassSummary> {
        let mut xr = req.desired.composite.clone().context("cannot get desired composite resource")?;
        let mut composed = req.desired.composed_resources();
        let summary = self.reconciler.reconcile(rendered, &mut xr, &mut composed)?;
        debug!(?summary, resources = composed.len(), "constructed desired composed resources");

        rsp.desired.composite = Some(xr);
        rsp.desired.set_composed_resources(composed);
        Ok(summary)
    }
}

fn fail(rsp: &mut RunFunctionResponse, e: anyhow::Error) {
    counter!("function_fatal_total", 1u64);
    let message = format!("{:#}", e);
    warn!(error = %message, "function run failed");
    rsp.fatal(message);
}
