//! In-memory cluster implementing both collaborator traits.
//!
//! Used by tests and for planning against a recorded inventory. Every
//! collaborator call is recorded, and any method can be made to fail with
//! [`MemoryCluster::fail_on`].

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::commands::{ClusterCommands, RuleId};
use crate::error::{ClusterError, ClusterResult};
use crate::failure_domain::FailureDomain;
use crate::inventory::{ClusterInventory, ControlService, ServiceKind, StorageUnit};

/// Id of the stock `replicated_rule`, which the automatic logic treats as custom.
pub const CUSTOM_RULE: RuleId = 0;
/// Id of the automatic storage-unit-level rule.
pub const AUTO_UNIT_RULE: RuleId = 1;
/// Id of the automatic host-level rule.
pub const AUTO_HOST_RULE: RuleId = 2;

const MUTATING: [&str; 6] = [
    "set_noout",
    "out_storage_unit",
    "in_storage_unit",
    "stop_service",
    "start_service",
    "switch_failure_domain",
];

const INVENTORY: [&str; 3] = ["members", "storage_units", "services"];

#[derive(Debug, Default)]
struct MemoryState {
    members: Vec<String>,
    units: Vec<StorageUnit>,
    services: Vec<ControlService>,
    unsafe_units: HashSet<u64>,
    out_units: BTreeSet<u64>,
    stopped: BTreeSet<ServiceKind>,
    noout: bool,
    ignore_noout: bool,
    rules: HashMap<String, RuleId>,
    auto_rules: HashMap<FailureDomain, String>,
    active_rule: RuleId,
    failures: HashMap<String, String>,
    calls: Vec<String>,
}

/// A cluster held entirely in memory.
#[derive(Debug)]
pub struct MemoryCluster {
    state: Mutex<MemoryState>,
}

impl MemoryCluster {
    /// Empty cluster with the stock and automatic rules registered and the
    /// stock rule active.
    pub fn new() -> Self {
        let mut state = MemoryState::default();
        state.rules.insert("replicated_rule".to_string(), CUSTOM_RULE);
        state.rules.insert("microceph_auto_osd".to_string(), AUTO_UNIT_RULE);
        state.rules.insert("microceph_auto_host".to_string(), AUTO_HOST_RULE);
        state
            .auto_rules
            .insert(FailureDomain::StorageUnit, "microceph_auto_osd".to_string());
        state
            .auto_rules
            .insert(FailureDomain::Host, "microceph_auto_host".to_string());
        state.active_rule = CUSTOM_RULE;
        Self {
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn edit(mut self, f: impl FnOnce(&mut MemoryState)) -> Self {
        f(self.state.get_mut().unwrap_or_else(PoisonError::into_inner));
        self
    }

    /// Adds cluster members.
    pub fn with_members(self, names: &[&str]) -> Self {
        self.edit(|s| s.members.extend(names.iter().map(|n| n.to_string())))
    }

    /// Adds an OSD hosted on `node`.
    pub fn with_unit(self, id: u64, node: &str) -> Self {
        self.edit(|s| s.units.push(StorageUnit::new(id, node)))
    }

    /// Adds a service hosted on `node`.
    pub fn with_service(self, kind: ServiceKind, node: &str) -> Self {
        self.edit(|s| s.services.push(ControlService::new(kind, node)))
    }

    /// Makes `ok_to_stop` answer `false` for this unit.
    pub fn with_unsafe_unit(self, id: u64) -> Self {
        self.edit(|s| {
            s.unsafe_units.insert(id);
        })
    }

    /// Initial state of the `noout` flag.
    pub fn with_noout(self, set: bool) -> Self {
        self.edit(|s| s.noout = set)
    }

    /// Rule the cluster currently places data with.
    pub fn with_active_rule(self, id: RuleId) -> Self {
        self.edit(|s| s.active_rule = id)
    }

    /// Registers a named rule.
    pub fn with_rule(self, name: &str, id: RuleId) -> Self {
        self.edit(|s| {
            s.rules.insert(name.to_string(), id);
        })
    }

    /// Removes a named rule.
    pub fn without_rule(self, name: &str) -> Self {
        self.edit(|s| {
            s.rules.remove(name);
        })
    }

    /// Makes `method` fail with `reason` on every call.
    pub fn fail_on(self, method: &str, reason: &str) -> Self {
        self.edit(|s| {
            s.failures.insert(method.to_string(), reason.to_string());
        })
    }

    /// `set_noout` reports success but leaves the flag unchanged.
    pub fn ignore_noout_changes(self) -> Self {
        self.edit(|s| s.ignore_noout = true)
    }

    /// Current `noout` flag.
    pub fn noout(&self) -> bool {
        self.state().noout
    }

    /// OSDs currently marked out.
    pub fn out_units(&self) -> Vec<u64> {
        self.state().out_units.iter().copied().collect()
    }

    /// Service kinds currently stopped.
    pub fn stopped_services(&self) -> Vec<ServiceKind> {
        self.state().stopped.iter().copied().collect()
    }

    /// Rule currently in use.
    pub fn active_rule(&self) -> RuleId {
        self.state().active_rule
    }

    /// Every collaborator call so far, as `method(args)`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Calls that change cluster state.
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| MUTATING.iter().any(|m| c.starts_with(&format!("{}(", m))))
            .collect()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Records the call and returns the state guard, or the injected failure.
    fn enter(&self, method: &str, args: String) -> ClusterResult<MutexGuard<'_, MemoryState>> {
        let mut state = self.state();
        debug!(method, args = %args, "memory cluster call");
        state.calls.push(format!("{}({})", method, args));
        if let Some(reason) = state.failures.get(method) {
            let reason = reason.clone();
            return Err(if INVENTORY.contains(&method) {
                ClusterError::Inventory(format!("{}: {}", method, reason))
            } else {
                ClusterError::Command {
                    command: method.to_string(),
                    reason,
                }
            });
        }
        Ok(state)
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterInventory for MemoryCluster {
    async fn members(&self) -> ClusterResult<Vec<String>> {
        Ok(self.enter("members", String::new())?.members.clone())
    }

    async fn storage_units(&self) -> ClusterResult<Vec<StorageUnit>> {
        Ok(self.enter("storage_units", String::new())?.units.clone())
    }

    async fn services(&self) -> ClusterResult<Vec<ControlService>> {
        Ok(self.enter("services", String::new())?.services.clone())
    }
}

#[async_trait]
impl ClusterCommands for MemoryCluster {
    async fn ok_to_stop(&self, unit: u64) -> ClusterResult<bool> {
        let state = self.enter("ok_to_stop", unit.to_string())?;
        if !state.units.iter().any(|u| u.id == unit) {
            return Err(ClusterError::Command {
                command: "ok_to_stop".to_string(),
                reason: format!("osd.{} does not exist", unit),
            });
        }
        Ok(!state.unsafe_units.contains(&unit))
    }

    async fn set_noout(&self, set: bool) -> ClusterResult<()> {
        let mut state = self.enter("set_noout", set.to_string())?;
        if !state.ignore_noout {
            state.noout = set;
        }
        Ok(())
    }

    async fn noout_set(&self) -> ClusterResult<bool> {
        Ok(self.enter("noout_set", String::new())?.noout)
    }

    async fn out_storage_unit(&self, unit: u64) -> ClusterResult<()> {
        self.enter("out_storage_unit", unit.to_string())?
            .out_units
            .insert(unit);
        Ok(())
    }

    async fn in_storage_unit(&self, unit: u64) -> ClusterResult<()> {
        self.enter("in_storage_unit", unit.to_string())?
            .out_units
            .remove(&unit);
        Ok(())
    }

    async fn stop_service(&self, kind: ServiceKind) -> ClusterResult<()> {
        self.enter("stop_service", kind.to_string())?.stopped.insert(kind);
        Ok(())
    }

    async fn start_service(&self, kind: ServiceKind) -> ClusterResult<()> {
        self.enter("start_service", kind.to_string())?.stopped.remove(&kind);
        Ok(())
    }

    async fn default_rule_id(&self) -> ClusterResult<RuleId> {
        Ok(self.enter("default_rule_id", String::new())?.active_rule)
    }

    async fn rule_id(&self, name: &str) -> ClusterResult<RuleId> {
        let state = self.enter("rule_id", name.to_string())?;
        state
            .rules
            .get(name)
            .copied()
            .ok_or_else(|| ClusterError::UnknownRule(name.to_string()))
    }

    async fn switch_failure_domain(
        &self,
        from: FailureDomain,
        to: FailureDomain,
    ) -> ClusterResult<()> {
        let mut state = self.enter("switch_failure_domain", format!("{}, {}", from, to))?;
        let target = state
            .auto_rules
            .get(&to)
            .cloned()
            .ok_or_else(|| ClusterError::UnknownRule(to.to_string()))?;
        let id = state
            .rules
            .get(&target)
            .copied()
            .ok_or(ClusterError::UnknownRule(target))?;
        state.active_rule = id;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls_in_order() {
        let cluster = MemoryCluster::new().with_unit(7, "a");
        cluster.storage_units().await.unwrap();
        cluster.ok_to_stop(7).await.unwrap();
        cluster.set_noout(true).await.unwrap();
        assert_eq!(
            cluster.calls(),
            vec!["storage_units()", "ok_to_stop(7)", "set_noout(true)"]
        );
        assert_eq!(cluster.mutating_calls(), vec!["set_noout(true)"]);
    }

    #[tokio::test]
    async fn test_fail_on_inventory_and_command() {
        let cluster = MemoryCluster::new()
            .fail_on("members", "down")
            .fail_on("in_storage_unit", "busy");
        assert_eq!(
            cluster.members().await.unwrap_err(),
            ClusterError::Inventory("members: down".to_string())
        );
        assert_eq!(
            cluster.in_storage_unit(1).await.unwrap_err(),
            ClusterError::Command {
                command: "in_storage_unit".to_string(),
                reason: "busy".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_ok_to_stop_unknown_unit() {
        let cluster = MemoryCluster::new();
        assert!(cluster.ok_to_stop(9).await.is_err());
    }

    #[tokio::test]
    async fn test_switch_sets_target_rule_active() {
        let cluster = MemoryCluster::new().with_active_rule(AUTO_HOST_RULE);
        cluster
            .switch_failure_domain(FailureDomain::Host, FailureDomain::StorageUnit)
            .await
            .unwrap();
        assert_eq!(cluster.active_rule(), AUTO_UNIT_RULE);
        assert_eq!(cluster.rule_id("microceph_auto_host").await.unwrap(), AUTO_HOST_RULE);
    }

    #[tokio::test]
    async fn test_custom_rule_registration() {
        let cluster = MemoryCluster::new().with_rule("site_rule", 9).with_active_rule(9);
        assert_eq!(cluster.default_rule_id().await.unwrap(), 9);
        assert_eq!(cluster.rule_id("site_rule").await.unwrap(), 9);
        assert!(cluster.rule_id("nope").await.is_err());
    }
}
