//! Document classification by declared type identity.

use stencil_core::{Object, ObjectExt, ReservedNames, TypeMeta};

use crate::ComposeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Same apiVersion and kind as the composite: contributes to its status.
    CompositeStatus,
    /// Meta document carrying connection secret payloads.
    ConnectionDetails,
    /// Anything else is a composed resource.
    Composed,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::CompositeStatus => "composite_status",
            Category::ConnectionDetails => "connection_details",
            Category::Composed => "composed",
        }
    }
}

/// First match wins: composite identity, then the reserved meta apiVersion,
/// then composed.
pub fn classify(doc: &Object, composite: &TypeMeta, names: &ReservedNames) -> Result<Category, ComposeError> {
    let tm = doc.type_meta();
    if tm.api_version == composite.api_version && tm.kind == composite.kind {
        return Ok(Category::CompositeStatus);
    }
    if tm.api_version == names.meta_api_version {
        if tm.kind == names.connection_details_kind {
            return Ok(Category::ConnectionDetails);
        }
        return Err(ComposeError::InvalidMetaKind(tm.kind));
    }
    Ok(Category::Composed)
}
