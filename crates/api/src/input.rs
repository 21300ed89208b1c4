//! Function input and template sources.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::RunFunctionRequest;

pub const INPUT_API_VERSION: &str = "gotemplating.fn.crossplane.io/v1beta1";
pub const INPUT_KIND: &str = "GoTemplate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Inline,
    FileSystem,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Inline => "Inline",
            SourceKind::FileSystem => "FileSystem",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineSpec {
    #[serde(default)]
    pub template: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemSpec {
    #[serde(default)]
    pub dir_path: String,
}

/// The function's `input` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    pub source: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<InlineSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_system: Option<FileSystemSpec>,
}

impl Input {
    pub fn from_request(req: &RunFunctionRequest) -> Result<Self> {
        let raw = req.input.clone().ok_or_else(|| anyhow!("request has no input"))?;
        serde_json::from_value(raw).context("parsing input")
    }
}

/// Where template text comes from.
pub trait TemplateSource {
    fn templates(&self) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct InlineSource {
    template: String,
}

impl InlineSource {
    pub fn new(template: impl Into<String>) -> Self { Self { template: template.into() } }
}

impl TemplateSource for InlineSource {
    fn templates(&self) -> Result<String> { Ok(self.template.clone()) }
}

/// Regular files of one directory, in file name order, joined as separate
/// YAML documents. Subdirectories are not descended into.
#[derive(Debug, Clone)]
pub struct FileSystemSource {
    dir: PathBuf,
}

impl FileSystemSource {
    pub fn new(dir: impl AsRef<Path>) -> Self { Self { dir: dir.as_ref().to_path_buf() } }
}

impl TemplateSource for FileSystemSource {
    fn templates(&self) -> Result<String> {
        let entries = std::fs::read_dir(&self.dir).with_context(|| format!("reading template dir {}", self.dir.display()))?;
        let mut files: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        let mut out = String::new();
        for path in files {
            let text = std::fs::read_to_string(&path).with_context(|| format!("reading template {}", path.display()))?;
            if !out.is_empty() {
                out.push_str("\n---\n");
            }
            out.push_str(&text);
        }
        Ok(out)
    }
}

/// Pick the template source named by `input`.
pub fn template_source(input: &Input) -> Result<Box<dyn TemplateSource>> {
    match input.source {
        SourceKind::Inline => {
            let template = input.inline.as_ref().map(|i| i.template.as_str()).unwrap_or_default();
            if template.is_empty() {
                bail!("inline.template should be provided");
            }
            Ok(Box::new(InlineSource::new(template)))
        }
        SourceKind::FileSystem => {
            let dir = input.file_system.as_ref().map(|f| f.dir_path.as_str()).unwrap_or_default();
            if dir.is_empty() {
                bail!("fileSystem.dirPath should be provided");
            }
            Ok(Box::new(FileSystemSource::new(dir)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(v: serde_json::Value) -> Input {
        let req = RunFunctionRequest { input: Some(v), ..RunFunctionRequest::default() };
        Input::from_request(&req).unwrap()
    }

    #[test]
    fn inline_source() {
        let i = input(json!({
            "apiVersion": INPUT_API_VERSION,
            "kind": INPUT_KIND,
            "source": "Inline",
            "inline": { "template": "kind: A" }
        }));
        assert_eq!(template_source(&i).unwrap().templates().unwrap(), "kind: A");
    }

    #[test]
    fn inline_source_requires_template() {
        let i = input(json!({ "source": "Inline" }));
        let e = template_source(&i).err().unwrap();
        assert_eq!(e.to_string(), "inline.template should be provided");
    }

    #[test]
    fn unknown_source_is_an_input_error() {
        let req = RunFunctionRequest { input: Some(json!({ "source": "Git" })), ..RunFunctionRequest::default() };
        assert!(Input::from_request(&req).is_err());
        assert!(Input::from_request(&RunFunctionRequest::default()).is_err());
    }

    #[test]
    fn file_system_source_joins_files_in_name_order() {
        let dir = std::env::temp_dir().join(format!("stencil-fs-source-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("b.yaml"), "kind: B\n").unwrap();
        std::fs::write(dir.join("a.yaml"), "kind: A\n").unwrap();
        std::fs::write(dir.join("nested").join("c.yaml"), "kind: C\n").unwrap();

        let i = input(json!({ "source": "FileSystem", "fileSystem": { "dirPath": dir.to_string_lossy() } }));
        let text = template_source(&i).unwrap().templates().unwrap();
        std::fs::remove_dir_all(&dir).ok();
        assert_eq!(text, "kind: A\n\n---\nkind: B\n");
    }
}
