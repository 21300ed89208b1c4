//! Stencil compose: reconcile rendered documents into the desired composite
//! and composed resources.
//!
//! One pass decodes the whole stream, classifies each document and routes it:
//! status patches merge into the composite, connection detail documents feed
//! its connection secret, everything else becomes a named composed resource.
//! The first error abandons the pass and leaves the caller's state untouched.

#![forbid(unsafe_code)]

use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use stencil_core::{ComposedResources, CompositeResource, ObjectExt, ReservedNames};
use stencil_manifest::{decode_all, DecodeLimits};
use tracing::debug;

pub mod classify;
pub mod composed;
pub mod composite;
pub mod connection;
mod error;

pub use classify::{classify, Category};
pub use composed::assemble;
pub use composite::merge_status;
pub use connection::extract_connection_details;
pub use error::ComposeError;

/// What a successful pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub documents: usize,
    pub status_patches: usize,
    pub connection_details: usize,
    pub composed: usize,
    /// Composed entries that replaced an existing entry of the same name.
    pub replaced: usize,
}

/// Reconciliation engine. Immutable; one instance can serve any number of
/// passes.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    names: ReservedNames,
    limits: DecodeLimits,
}

impl Reconciler {
    pub fn new(names: ReservedNames, limits: DecodeLimits) -> Self { Self { names, limits } }

    /// Default reserved names with decode limits from the environment.
    pub fn from_env() -> Self { Self::new(ReservedNames::default(), DecodeLimits::from_env()) }

    pub fn names(&self) -> &ReservedNames { &self.names }

    /// Run one pass over `manifests`.
    ///
    /// `composite` and `composed` are only written when the whole pass
    /// succeeds. Composed entries absent from this render are left alone.
    pub fn reconcile(
        &self,
        manifests: &[u8],
        composite: &mut CompositeResource,
        composed: &mut ComposedResources,
    ) -> Result<PassSummary, ComposeError> {
        let t0 = Instant::now();
        let res = self.pass(manifests, composite, composed);
        histogram!("compose_pass_ms", t0.elapsed().as_secs_f64() * 1000.0);
        match &res {
            Ok(summary) => {
                counter!("compose_pass_ok", 1u64);
                debug!(?summary, "reconciliation pass complete");
            }
            Err(e) => {
                counter!("compose_pass_err", 1u64);
                debug!(error = %e, "reconciliation pass failed");
            }
        }
        res
    }

    fn pass(
        &self,
        manifests: &[u8],
        composite: &mut CompositeResource,
        composed: &mut ComposedResources,
    ) -> Result<PassSummary, ComposeError> {
        let docs = decode_all(manifests, self.limits)?;
        let identity = composite.type_meta();
        let mut xr = composite.clone();
        let mut resources = composed.clone();
        let mut summary = PassSummary { documents: docs.len(), ..PassSummary::default() };

        for (index, doc) in docs.into_iter().enumerate() {
            let category = classify(&doc, &identity, &self.names)?;
            debug!(index, category = category.as_str(), name = doc.object_name(), "classified document");
            counter!("compose_documents_total", 1u64, "category" => category.as_str());
            match category {
                Category::CompositeStatus => {
                    merge_status(&mut xr, &doc)?;
                    summary.status_patches += 1;
                }
                Category::ConnectionDetails => {
                    extract_connection_details(&doc, &mut xr.connection_details);
                    summary.connection_details += 1;
                }
                Category::Composed => {
                    let (name, resource) = assemble(doc, &self.names)?;
                    if resources.insert(name, resource).is_some() {
                        summary.replaced += 1;
                    }
                    summary.composed += 1;
                }
            }
        }

        *composite = xr;
        *composed = resources;
        Ok(summary)
    }
}
