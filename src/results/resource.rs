//! # Resource identities and outcomes.
//!
//! A resource id is a state key built from four components joined by the
//! reserved delimiter `_|-`:
//!
//! ```text
//! pkg_|-install_|-nginx_|-installed
//! ^mod   ^id       ^name   ^function
//! ```
//!
//! Any key containing the delimiter is a resource result; any other key is
//! plain metadata. [`ResourceId::parse`] is the single place that decides.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Marker that separates the components of a resource id.
pub const RESOURCE_DELIMITER: &str = "_|-";

/// Key of one resource inside a target's result.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Returns `Some` iff `key` carries the resource delimiter.
    pub fn parse(key: &str) -> Option<Self> {
        key.contains(RESOURCE_DELIMITER)
            .then(|| ResourceId(key.to_string()))
    }

    /// Full key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn component(&self, n: usize) -> Option<&str> {
        self.0.split(RESOURCE_DELIMITER).nth(n)
    }

    /// State module (`pkg`).
    pub fn module(&self) -> Option<&str> {
        self.component(0)
    }

    /// Declaration id (`install`).
    pub fn id(&self) -> Option<&str> {
        self.component(1)
    }

    /// Resource name (`nginx`).
    pub fn name(&self) -> Option<&str> {
        self.component(2)
    }

    /// State function (`installed`).
    pub fn function(&self) -> Option<&str> {
        self.component(3)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of applying one resource on one target.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResourceOutcome {
    /// False if the remote application failed.
    pub succeeded: bool,
    /// Dry-run result: the resource would change (`result: null`).
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub pending: bool,
    /// Remote comment, possibly empty.
    pub comment: String,
    /// What changed (or would change).
    pub changes: Value,
}

impl ResourceOutcome {
    /// Successful outcome with a comment.
    pub fn ok(comment: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            pending: false,
            comment: comment.into(),
            changes: Value::Object(Default::default()),
        }
    }

    /// Failed outcome with a comment.
    pub fn failed(comment: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            ..Self::ok(comment)
        }
    }

    /// Reads an outcome from its JSON form.
    ///
    /// The success flag is `succeeded` or `result`; `null` means pending
    /// (not failed), a missing flag counts as failed. `comment` may be a
    /// string or a list of strings.
    pub fn from_value(value: &Value) -> Self {
        let Value::Object(obj) = value else {
            return Self::failed(format!("malformed resource outcome: {value}"));
        };

        let flag = obj.get("succeeded").or_else(|| obj.get("result"));
        let (succeeded, pending) = match flag {
            Some(Value::Bool(b)) => (*b, false),
            Some(Value::Null) => (true, true),
            _ => (false, false),
        };

        let comment = match obj.get("comment") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(lines)) => lines
                .iter()
                .map(|l| l.as_str().map_or_else(|| l.to_string(), str::to_string))
                .collect::<Vec<_>>()
                .join("\n"),
            Some(other) => other.to_string(),
        };

        Self {
            succeeded,
            pending,
            comment,
            changes: obj
                .get("changes")
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delimiter_decides_resource_keys() {
        let id = ResourceId::parse("pkg_|-install_|-nginx_|-installed").unwrap();
        assert_eq!(id.module(), Some("pkg"));
        assert_eq!(id.id(), Some("install"));
        assert_eq!(id.name(), Some("nginx"));
        assert_eq!(id.function(), Some("installed"));

        assert!(ResourceId::parse("comment").is_none());
        assert!(ResourceId::parse("pkg_|install").is_none());
    }

    #[test]
    fn reads_both_flag_spellings() {
        assert!(!ResourceOutcome::from_value(&json!({"succeeded": false})).succeeded);
        assert!(ResourceOutcome::from_value(&json!({"result": true})).succeeded);

        let pending = ResourceOutcome::from_value(&json!({"result": null}));
        assert!(pending.succeeded && pending.pending);
    }

    #[test]
    fn missing_flag_or_garbage_is_a_failure() {
        assert!(!ResourceOutcome::from_value(&json!({"comment": "?"})).succeeded);
        let bad = ResourceOutcome::from_value(&json!("oops"));
        assert!(!bad.succeeded);
        assert!(bad.comment.starts_with("malformed"));
    }

    #[test]
    fn comment_lists_are_joined() {
        let o = ResourceOutcome::from_value(&json!({
            "result": true,
            "comment": ["line one", "line two"],
            "changes": {"old": "1.0", "new": "1.1"},
        }));
        assert_eq!(o.comment, "line one\nline two");
        assert_eq!(o.changes["new"], "1.1");
    }
}
