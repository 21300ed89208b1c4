//! Assembly of composed resources from rendered documents.

use stencil_core::{ComposedResource, FieldPathError, Name, Object, ObjectExt, Ready, ReservedNames};

use crate::ComposeError;

/// Turn a rendered document into a named composed resource.
///
/// The name comes from the composition-resource-name annotation and the
/// readiness from the optional ready annotation. Both annotations are removed
/// from the body; nothing else is touched.
pub fn assemble(mut doc: Object, names: &ReservedNames) -> Result<(Name, ComposedResource), ComposeError> {
    let resource = doc.object_name().to_string();
    let annotations_err = |source: FieldPathError| ComposeError::Annotations { resource: resource.clone(), source };

    let name = match doc.annotation(&names.composition_resource_name).map_err(annotations_err)? {
        Some(n) => Name::new(n),
        None => {
            return Err(ComposeError::MissingName {
                resource: resource.clone(),
                annotation: names.composition_resource_name.clone(),
            })
        }
    };

    let ready = match doc.annotation(&names.ready).map_err(annotations_err)? {
        Some(v) => v.parse::<Ready>().map_err(ComposeError::InvalidReady)?,
        None => Ready::Unspecified,
    };

    doc.remove_annotation(&names.ready);
    doc.remove_annotation(&names.composition_resource_name);
    Ok((name, ComposedResource { resource: doc, ready }))
}
