//! The unit of maintenance work and its reported outcome.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MaintenanceError, MaintenanceResult};

/// One step of a maintenance plan.
///
/// An operation is immutable once built. `describe` must be free of side
/// effects so that dry runs can preview a plan without touching the cluster.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Short stable name, used in logs.
    fn name(&self) -> &'static str;

    /// Human-readable description of what the step does to `node`.
    fn describe(&self, node: &str) -> String;

    /// Perform the step against `node`.
    async fn execute(&self, node: &str) -> MaintenanceResult<()>;
}

/// Outcome of one operation, in the shape returned to callers.
///
/// `error` is empty when the step succeeded or was only previewed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpResult {
    /// Description of the step.
    pub action: String,
    /// Error text, empty on success.
    pub error: String,
}

impl OpResult {
    /// Successful or previewed step.
    pub fn ok(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            error: String::new(),
        }
    }

    /// Failed step carrying the error's display text.
    pub fn failed(action: impl Into<String>, error: &MaintenanceError) -> Self {
        Self {
            action: action.into(),
            error: error.to_string(),
        }
    }

    /// Whether the step succeeded.
    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }
}

/// Whether any result in the list carries an error.
pub fn any_failed(results: &[OpResult]) -> bool {
    results.iter().any(|r| !r.is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_result_has_empty_error() {
        let r = OpResult::ok("Run `ceph osd set noout`.");
        assert!(r.is_ok());
        assert_eq!(r.error, "");
    }

    #[test]
    fn test_failed_result_carries_display() {
        let r = OpResult::failed("check", &MaintenanceError::NodeNotFound("n1".to_string()));
        assert!(!r.is_ok());
        assert_eq!(r.error, "Node 'n1' not found");
    }

    #[test]
    fn test_wire_shape() {
        let r = OpResult::ok("x");
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json, serde_json::json!({"action": "x", "error": ""}));
    }

    #[test]
    fn test_any_failed() {
        let ok = OpResult::ok("a");
        let bad = OpResult::failed("b", &MaintenanceError::PostCondition("nope".into()));
        assert!(!any_failed(&[ok.clone()]));
        assert!(any_failed(&[ok, bad]));
        assert!(!any_failed(&[]));
    }
}
