//! # Classified result payloads.
//!
//! Upstream producers multiplex two shapes onto one mapping: resource results
//! (keys carrying the resource delimiter) and plain metadata. The mapping is
//! split once, here; nothing downstream re-inspects raw keys.
//!
//! ```rust
//! use serde_json::json;
//! use stagevisor::Payload;
//!
//! let raw = json!({
//!     "pkg_|-install_|-nginx_|-installed": {"succeeded": false},
//!     "comment": "ok",
//! });
//! let payload = Payload::classify(raw.as_object().unwrap());
//! assert_eq!(payload.resources.len(), 1);
//! assert!(payload.has_failures());
//! assert_eq!(payload.metadata["comment"], "ok");
//! ```

use serde::Serialize;

use super::resource::{ResourceId, ResourceOutcome};
use crate::events::EventData;

/// One resource and its outcome.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Resource {
    /// Resource key.
    pub id: ResourceId,
    /// What happened to it.
    #[serde(flatten)]
    pub outcome: ResourceOutcome,
}

/// A mapping split into resource results and metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Payload {
    /// Resource results, in key order.
    pub resources: Vec<Resource>,
    /// Everything that is not a resource result.
    pub metadata: EventData,
}

impl Payload {
    /// Splits `raw` by key shape.
    pub fn classify(raw: &EventData) -> Self {
        let mut payload = Payload::default();
        for (key, value) in raw {
            match ResourceId::parse(key) {
                Some(id) => payload.resources.push(Resource {
                    id,
                    outcome: ResourceOutcome::from_value(value),
                }),
                None => {
                    payload.metadata.insert(key.clone(), value.clone());
                }
            }
        }
        payload
    }

    /// Resources that failed to apply.
    pub fn failed_resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| !r.outcome.succeeded)
    }

    /// True if at least one resource failed.
    pub fn has_failures(&self) -> bool {
        self.failed_resources().next().is_some()
    }

    /// True if there is neither a resource nor metadata.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.metadata.is_empty()
    }
}
