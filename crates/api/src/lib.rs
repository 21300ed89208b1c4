//! Stencil API: the function envelope around the compose engine.
//!
//! A request carries the function input (where the template lives), the
//! observed and desired state. [`Function::run_function`] loads the template,
//! renders it with the request as data context, reconciles the output into the
//! desired state and reports the outcome as response results.

#![forbid(unsafe_code)]

mod function;
pub mod input;
pub mod render;
mod wire;

pub use function::{request_context, Function, DEFAULT_TTL};
pub use input::{template_source, FileSystemSource, InlineSource, Input, SourceKind, TemplateSource};
pub use render::{Renderer, Verbatim};
pub use wire::{FnResult, RequestMeta, Resource, ResponseMeta, RunFunctionRequest, RunFunctionResponse, Severity, State};
