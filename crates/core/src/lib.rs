//! Stencil core types: the composite and composed aggregates a reconciliation
//! pass mutates, readiness and naming conventions, and typed field access.

#![forbid(unsafe_code)]

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod fieldpath;

pub use fieldpath::{shape_of, FieldPathError, ObjectExt};
pub use k8s_openapi::ByteString;
pub use kube::core::TypeMeta;

/// A rendered document or resource body: an ordered string-keyed mapping.
pub type Object = serde_json::Map<String, Value>;

/// Connection secret payloads attached to the composite, keyed by secret key.
pub type ConnectionDetails = BTreeMap<String, ByteString>;

/// Desired composed resources keyed by their name within the composition.
pub type ComposedResources = BTreeMap<Name, ComposedResource>;

pub const ANNOTATION_KEY_COMPOSITION_RESOURCE_NAME: &str = "crossplane.io/composition-resource-name";
pub const ANNOTATION_KEY_READY: &str = "meta.gotemplating.fn.crossplane.io/ready";
pub const META_API_VERSION: &str = "meta.gotemplating.fn.crossplane.io/v1alpha1";
pub const KIND_COMPOSITE_CONNECTION_DETAILS: &str = "CompositeConnectionDetails";

/// Reserved annotation keys and meta types recognised in rendered output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservedNames {
    /// Annotation carrying a composed resource's name within the composition.
    pub composition_resource_name: String,
    /// Annotation carrying a readiness override.
    pub ready: String,
    /// apiVersion of engine-private signalling documents.
    pub meta_api_version: String,
    /// Kind of the connection details signalling document.
    pub connection_details_kind: String,
}

impl Default for ReservedNames {
    fn default() -> Self {
        Self {
            composition_resource_name: ANNOTATION_KEY_COMPOSITION_RESOURCE_NAME.to_string(),
            ready: ANNOTATION_KEY_READY.to_string(),
            meta_api_version: META_API_VERSION.to_string(),
            connection_details_kind: KIND_COMPOSITE_CONNECTION_DETAILS.to_string(),
        }
    }
}

/// Readiness override for a composed resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ready {
    #[default]
    Unspecified,
    True,
    False,
}

impl Ready {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ready::Unspecified => "Unspecified",
            Ready::True => "True",
            Ready::False => "False",
        }
    }
}

impl fmt::Display for Ready {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0} is invalid, ready annotation must be True, Unspecified, or False")]
pub struct InvalidReady(pub String);

impl FromStr for Ready {
    type Err = InvalidReady;

    /// Tokens are case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "True" => Ok(Ready::True),
            "False" => Ok(Ready::False),
            "Unspecified" => Ok(Ready::Unspecified),
            other => Err(InvalidReady(other.to_string())),
        }
    }
}

/// Name of a composed resource within its composition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self { Self(name.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str { &self.0 }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

impl From<String> for Name {
    fn from(s: String) -> Self { Self(s) }
}

/// The desired composite resource being reconciled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeResource {
    pub resource: Object,
    #[serde(default)]
    pub connection_details: ConnectionDetails,
}

impl CompositeResource {
    pub fn new(resource: Object) -> Self { Self { resource, connection_details: ConnectionDetails::new() } }

    /// Identity used to recognise status patches aimed at this composite.
    pub fn type_meta(&self) -> TypeMeta { self.resource.type_meta() }

    /// Current `status`; an absent or null status reads as empty.
    pub fn status(&self) -> Result<Object, FieldPathError> {
        match self.resource.get("status") {
            None | Some(Value::Null) => Ok(Object::new()),
            Some(_) => self.resource.nested_object(&["status"]).cloned(),
        }
    }

    pub fn set_status(&mut self, status: Object) -> Result<(), FieldPathError> {
        self.resource.set_nested(&["status"], Value::Object(status))
    }
}

/// One desired composed resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposedResource {
    pub resource: Object,
    #[serde(default)]
    pub ready: Ready,
}

impl ComposedResource {
    pub fn new(resource: Object) -> Self { Self { resource, ready: Ready::Unspecified } }
}

pub mod prelude {
    pub use super::{
        ComposedResource, ComposedResources, CompositeResource, ConnectionDetails, Name, Object, ObjectExt, Ready,
        ReservedNames,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn composite(v: Value) -> CompositeResource {
        CompositeResource::new(v.as_object().cloned().unwrap())
    }

    #[test]
    fn ready_tokens_are_case_sensitive() {
        assert_eq!("True".parse::<Ready>().unwrap(), Ready::True);
        assert_eq!("False".parse::<Ready>().unwrap(), Ready::False);
        assert_eq!("Unspecified".parse::<Ready>().unwrap(), Ready::Unspecified);
        let e = "true".parse::<Ready>().unwrap_err();
        assert_eq!(e.to_string(), "true is invalid, ready annotation must be True, Unspecified, or False");
        assert_eq!(Ready::default(), Ready::Unspecified);
    }

    #[test]
    fn composite_status_absent_reads_empty() {
        let xr = composite(json!({ "apiVersion": "example.org/v1", "kind": "XDatabase" }));
        assert!(xr.status().unwrap().is_empty());
        assert_eq!(xr.type_meta().kind, "XDatabase");
    }

    #[test]
    fn composite_null_status_reads_empty() {
        let xr = composite(json!({ "kind": "X", "status": null }));
        assert!(xr.status().unwrap().is_empty());
    }

    #[test]
    fn composite_status_must_be_mapping() {
        let xr = composite(json!({ "kind": "X", "status": ["nope"] }));
        assert!(matches!(xr.status(), Err(FieldPathError::WrongShape { .. })));
    }

    #[test]
    fn set_status_replaces_subtree() {
        let mut xr = composite(json!({ "kind": "X", "status": { "a": 1 } }));
        let mut next = Object::new();
        next.insert("b".into(), json!(2));
        xr.set_status(next).unwrap();
        assert_eq!(xr.resource["status"], json!({ "b": 2 }));
    }

    #[test]
    fn name_lookup_by_str() {
        let mut m = ComposedResources::new();
        m.insert(Name::from("bucket"), ComposedResource::default());
        assert!(m.contains_key("bucket"));
        assert_eq!(Name::new("bucket").to_string(), "bucket");
    }
}
