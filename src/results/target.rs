//! # One target's return.
//!
//! Return events come in two shapes:
//!
//! ```text
//! {"return": {<resource>: {...}, ...}, "success": true, "retcode": 0, "fun": "state.sls"}
//! {<resource>: {...}, ...}
//! ```
//!
//! The envelope form is unwrapped; `success == false` or a non-zero `retcode`
//! marks the target failed even when no individual resource did. A return that
//! is not a mapping (`test.ping` → `true`) is kept as metadata under `return`.

use serde::Serialize;
use serde_json::Value;

use super::payload::Payload;
use crate::events::EventData;

/// Parsed return of one target.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TargetResult {
    /// Resources and metadata from the return.
    #[serde(flatten)]
    pub payload: Payload,
    /// Envelope `success` flag, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Envelope `retcode`, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retcode: Option<i64>,
}

impl TargetResult {
    /// Reads the data of a `job/<id>/ret/<target>` event.
    pub fn from_return(data: &EventData) -> Self {
        let success = data.get("success").and_then(Value::as_bool);
        let retcode = data.get("retcode").and_then(Value::as_i64);

        let payload = match data.get("return") {
            Some(Value::Object(ret)) => Payload::classify(ret),
            Some(other) => {
                let mut metadata = EventData::new();
                metadata.insert("return".to_string(), other.clone());
                Payload {
                    resources: Vec::new(),
                    metadata,
                }
            }
            None => Payload::classify(data),
        };

        Self {
            payload,
            success,
            retcode,
        }
    }

    /// True unless the envelope or any resource reports a failure.
    pub fn succeeded(&self) -> bool {
        self.success != Some(false)
            && !matches!(self.retcode, Some(c) if c != 0)
            && !self.payload.has_failures()
    }
}
