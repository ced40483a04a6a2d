//! Error types for maintenance orchestration.

use thiserror::Error;

use crate::failure_domain::{FailureDomain, SwitchDirection};
use crate::inventory::ServiceKind;

/// Result type alias for collaborator calls.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Result type alias for maintenance operations.
pub type MaintenanceResult<T> = Result<T, MaintenanceError>;

/// Failures reported by the inventory accessor or the command capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    /// An inventory query failed.
    #[error("inventory query failed: {0}")]
    Inventory(String),

    /// A daemon command returned an error.
    #[error("command `{command}` failed: {reason}")]
    Command {
        /// The command that was attempted.
        command: String,
        /// Free-text reason from the command shim.
        reason: String,
    },

    /// A named placement rule does not exist.
    #[error("crush rule '{0}' not found")]
    UnknownRule(String),
}

/// A single service kind whose remaining count is below its minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceShortfall {
    /// The service kind.
    pub kind: ServiceKind,
    /// Configured minimum.
    pub required: usize,
    /// Count remaining outside the target node.
    pub remaining: usize,
}

impl std::fmt::Display for ServiceShortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (need {}, {} remaining)",
            self.kind, self.required, self.remaining
        )
    }
}

/// Error variants for maintenance operations.
///
/// The `Display` output of each variant is what ends up in
/// [`OpResult::error`](crate::operation::OpResult).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MaintenanceError {
    /// The target node is not a cluster member.
    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    /// One or more storage units failed the safe-to-stop predicate.
    #[error("{} cannot be safely stopped", format_units(.units))]
    UnsafeToStop {
        /// Ids of the failing units.
        units: Vec<u64>,
    },

    /// Control services left outside the node are below their minimums.
    #[error(
        "Not enough services in the cluster besides those in node '{node}': {}",
        format_shortfalls(.shortfalls)
    )]
    InsufficientServices {
        /// The node entering maintenance.
        node: String,
        /// Every kind that falls short.
        shortfalls: Vec<ServiceShortfall>,
    },

    /// A mutating step reported success but the observable state disagrees.
    #[error("{0}")]
    PostCondition(String),

    /// A failure-domain switch is needed but the operator did not confirm it.
    #[error(
        "{direction} failure domain from '{from}' to '{to}' is potentially dangerous, please confirm to continue"
    )]
    Unconfirmed {
        /// Current failure domain.
        from: FailureDomain,
        /// Failure domain the cluster would switch to.
        to: FailureDomain,
        /// Downgrade or upgrade.
        direction: SwitchDirection,
    },

    /// A collaborator call failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// The caller passed arguments the engine cannot act on.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl MaintenanceError {
    /// Whether this error came from a read-only safety predicate.
    pub fn is_preflight_violation(&self) -> bool {
        matches!(
            self,
            MaintenanceError::NodeNotFound(_)
                | MaintenanceError::UnsafeToStop { .. }
                | MaintenanceError::InsufficientServices { .. }
        )
    }
}

/// Formats unit ids the way the daemon tooling names them: `osd.1, osd.4`.
pub(crate) fn format_units(units: &[u64]) -> String {
    units
        .iter()
        .map(|id| format!("osd.{}", id))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_shortfalls(shortfalls: &[ServiceShortfall]) -> String {
    shortfalls
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsafe_to_stop_names_every_unit() {
        let err = MaintenanceError::UnsafeToStop { units: vec![1, 4] };
        assert_eq!(err.to_string(), "osd.1, osd.4 cannot be safely stopped");
    }

    #[test]
    fn test_insufficient_services_lists_shortfalls() {
        let err = MaintenanceError::InsufficientServices {
            node: "node-0".to_string(),
            shortfalls: vec![ServiceShortfall {
                kind: ServiceKind::MetadataServer,
                required: 1,
                remaining: 0,
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("node-0"));
        assert!(msg.contains("mds (need 1, 0 remaining)"));
    }

    #[test]
    fn test_unconfirmed_message_asks_for_confirmation() {
        let err = MaintenanceError::Unconfirmed {
            from: FailureDomain::Host,
            to: FailureDomain::StorageUnit,
            direction: SwitchDirection::Downgrade,
        };
        assert_eq!(
            err.to_string(),
            "Downgrade failure domain from 'host' to 'osd' is potentially dangerous, please confirm to continue"
        );
    }

    #[test]
    fn test_cluster_error_is_transparent() {
        let err: MaintenanceError = ClusterError::Command {
            command: "ceph osd set noout".to_string(),
            reason: "timed out".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "command `ceph osd set noout` failed: timed out");
    }

    #[test]
    fn test_preflight_violation_classification() {
        assert!(MaintenanceError::NodeNotFound("n".to_string()).is_preflight_violation());
        assert!(MaintenanceError::UnsafeToStop { units: vec![1] }.is_preflight_violation());
        assert!(!MaintenanceError::PostCondition("x".to_string()).is_preflight_violation());
        assert!(
            !MaintenanceError::Cluster(ClusterError::Inventory("x".to_string()))
                .is_preflight_violation()
        );
    }
}
