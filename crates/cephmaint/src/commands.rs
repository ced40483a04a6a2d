//! Primitive daemon actions the orchestrator depends on.

use async_trait::async_trait;

use crate::error::ClusterResult;
use crate::failure_domain::FailureDomain;
use crate::inventory::ServiceKind;

/// Numeric id of a placement (CRUSH) rule.
pub type RuleId = i64;

/// Command capability.
///
/// Every method maps to one daemon tool invocation or service supervisor
/// action. Implementations run on the member being maintained, so service
/// start/stop acts on the local node.
#[async_trait]
pub trait ClusterCommands: Send + Sync {
    /// Whether stopping `unit` now keeps data redundancy intact.
    async fn ok_to_stop(&self, unit: u64) -> ClusterResult<bool>;

    /// Set (`true`) or clear (`false`) the cluster-wide `noout` flag.
    async fn set_noout(&self, set: bool) -> ClusterResult<()>;

    /// Whether the `noout` flag is currently set.
    async fn noout_set(&self) -> ClusterResult<bool>;

    /// Take a unit administratively out and mark it down.
    async fn out_storage_unit(&self, unit: u64) -> ClusterResult<()>;

    /// Bring a unit administratively back in.
    async fn in_storage_unit(&self, unit: u64) -> ClusterResult<()>;

    /// Stop a service on the local node.
    async fn stop_service(&self, kind: ServiceKind) -> ClusterResult<()>;

    /// Start a service on the local node.
    async fn start_service(&self, kind: ServiceKind) -> ClusterResult<()>;

    /// Id of the pool default placement rule currently in effect.
    async fn default_rule_id(&self) -> ClusterResult<RuleId>;

    /// Resolve a rule name to its id.
    async fn rule_id(&self, name: &str) -> ClusterResult<RuleId>;

    /// Switch the automatic rule from one failure domain to the other.
    async fn switch_failure_domain(&self, from: FailureDomain, to: FailureDomain)
        -> ClusterResult<()>;
}
