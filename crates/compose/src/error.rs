use stencil_core::{FieldPathError, InvalidReady};
use stencil_manifest::DecodeError;

/// Reasons a reconciliation pass is abandoned. Every variant is fatal.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("cannot decode manifest")]
    Decode(#[from] DecodeError),
    #[error("cannot get desired composite status")]
    GetCompositeStatus(#[source] FieldPathError),
    #[error("cannot set desired composite status")]
    SetCompositeStatus(#[source] FieldPathError),
    #[error("invalid meta kind {0}")]
    InvalidMetaKind(String),
    #[error("cannot get composition resource name of {resource}: {annotation} annotation not found")]
    MissingName { resource: String, annotation: String },
    #[error("cannot get annotations of {resource}")]
    Annotations { resource: String, #[source] source: FieldPathError },
    #[error("invalid function input: {0}")]
    InvalidReady(InvalidReady),
}
