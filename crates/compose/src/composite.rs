//! Status patches aimed at the composite resource.

use stencil_core::{CompositeResource, Object, ObjectExt};

use crate::ComposeError;

/// Merge the patch document's `status` into the composite's `status`.
///
/// Single-level overwrite: every top-level key of the patch replaces the
/// existing value wholesale, keys only present on the composite are kept.
/// A missing or null status on either side reads as empty; the composite
/// always ends up with a `status` mapping.
pub fn merge_status(xr: &mut CompositeResource, patch: &Object) -> Result<(), ComposeError> {
    let mut dst = xr.status().map_err(ComposeError::GetCompositeStatus)?;
    // an empty `status:` renders as null
    if patch.get("status").is_some_and(|v| !v.is_null()) {
        let src = patch.nested_object(&["status"]).map_err(ComposeError::GetCompositeStatus)?;
        for (k, v) in src {
            dst.insert(k.clone(), v.clone());
        }
    }
    xr.set_status(dst).map_err(ComposeError::SetCompositeStatus)
}
