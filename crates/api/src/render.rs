//! Template rendering seam.

use anyhow::Result;
use serde_json::Value;

/// Turns template text plus a data context into a rendered byte stream.
pub trait Renderer {
    fn render(&self, template: &str, context: &Value) -> Result<Vec<u8>>;
}

/// Emits the template unchanged; for sources that already hold rendered
/// manifests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl Renderer for Verbatim {
    fn render(&self, template: &str, _context: &Value) -> Result<Vec<u8>> { Ok(template.as_bytes().to_vec()) }
}
