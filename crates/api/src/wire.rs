//! Function request/response envelope, limited to the fields stencil reads
//! or writes. Field names follow the protobuf JSON mapping.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stencil_core::{ComposedResource, ComposedResources, CompositeResource, ConnectionDetails, Name, Object, Ready};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFunctionRequest {
    #[serde(default)]
    pub meta: RequestMeta,
    #[serde(default)]
    pub observed: State,
    #[serde(default)]
    pub desired: State,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    #[serde(default)]
    pub tag: String,
}

/// Observed or desired state: one composite plus named composed resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite: Option<CompositeResource>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<Name, Resource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub resource: Object,
    #[serde(default, skip_serializing_if = "ConnectionDetails::is_empty")]
    pub connection_details: ConnectionDetails,
    #[serde(default, with = "ready_wire")]
    pub ready: Ready,
}

mod ready_wire {
    use serde::{Deserialize, Deserializer, Serializer};
    use stencil_core::Ready;

    pub fn serialize<S: Serializer>(ready: &Ready, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(match ready {
            Ready::Unspecified => "READY_UNSPECIFIED",
            Ready::True => "READY_TRUE",
            Ready::False => "READY_FALSE",
        })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Ready, D::Error> {
        let s = String::deserialize(d)?;
        match s.as_str() {
            "READY_UNSPECIFIED" => Ok(Ready::Unspecified),
            "READY_TRUE" => Ok(Ready::True),
            "READY_FALSE" => Ok(Ready::False),
            other => Err(serde::de::Error::unknown_variant(other, &["READY_UNSPECIFIED", "READY_TRUE", "READY_FALSE"])),
        }
    }
}

impl State {
    /// Composed resources in the shape the reconciler works on.
    pub fn composed_resources(&self) -> ComposedResources {
        self.resources
            .iter()
            .map(|(name, r)| (name.clone(), ComposedResource { resource: r.resource.clone(), ready: r.ready }))
            .collect()
    }

    /// Write composed resources back, keeping any connection details already
    /// recorded for a name.
    pub fn set_composed_resources(&mut self, composed: ComposedResources) {
        for (name, cd) in composed {
            let entry = self.resources.entry(name).or_default();
            entry.resource = cd.resource;
            entry.ready = cd.ready;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "SEVERITY_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "SEVERITY_FATAL")]
    Fatal,
    #[serde(rename = "SEVERITY_WARNING")]
    Warning,
    #[serde(rename = "SEVERITY_NORMAL")]
    Normal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FnResult {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMeta {
    #[serde(default)]
    pub tag: String,
    /// Protobuf JSON duration, e.g. `60s`.
    #[serde(default)]
    pub ttl: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunFunctionResponse {
    #[serde(default)]
    pub meta: ResponseMeta,
    #[serde(default)]
    pub desired: State,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<FnResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl RunFunctionResponse {
    /// Response seeded from a request: tag echoed, desired state and context
    /// passed through.
    pub fn to(req: &RunFunctionRequest, ttl: Duration) -> Self {
        Self {
            meta: ResponseMeta { tag: req.meta.tag.clone(), ttl: format!("{}s", ttl.as_secs()) },
            desired: req.desired.clone(),
            results: Vec::new(),
            context: req.context.clone(),
        }
    }

    pub fn fatal(&mut self, message: impl Into<String>) {
        self.results.push(FnResult { severity: Severity::Fatal, message: message.into() });
    }

    pub fn normal(&mut self, message: impl Into<String>) {
        self.results.push(FnResult { severity: Severity::Normal, message: message.into() });
    }

    pub fn is_fatal(&self) -> bool { self.results.iter().any(|r| r.severity == Severity::Fatal) }
}
