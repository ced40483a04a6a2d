//! State-mutating maintenance steps and their post-condition assertions.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::commands::ClusterCommands;
use crate::error::{MaintenanceError, MaintenanceResult};
use crate::inventory::{units_on, ClusterInventory, ServiceKind};
use crate::operation::Operation;

/// Sets the cluster-wide `noout` flag. Setting an already-set flag succeeds.
pub struct SetNoout {
    commands: Arc<dyn ClusterCommands>,
}

impl SetNoout {
    /// Builds the step over the given collaborators.
    pub fn new(commands: Arc<dyn ClusterCommands>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl Operation for SetNoout {
    fn name(&self) -> &'static str {
        "set-noout"
    }

    fn describe(&self, _node: &str) -> String {
        "Run `ceph osd set noout`.".to_string()
    }

    async fn execute(&self, _node: &str) -> MaintenanceResult<()> {
        self.commands.set_noout(true).await?;
        info!("set osd noout");
        Ok(())
    }
}

/// Clears the cluster-wide `noout` flag. Clearing an unset flag succeeds.
pub struct UnsetNoout {
    commands: Arc<dyn ClusterCommands>,
}

impl UnsetNoout {
    /// Builds the step over the given collaborators.
    pub fn new(commands: Arc<dyn ClusterCommands>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl Operation for UnsetNoout {
    fn name(&self) -> &'static str {
        "unset-noout"
    }

    fn describe(&self, _node: &str) -> String {
        "Run `ceph osd unset noout`.".to_string()
    }

    async fn execute(&self, _node: &str) -> MaintenanceResult<()> {
        self.commands.set_noout(false).await?;
        info!("unset osd noout");
        Ok(())
    }
}

/// Re-reads the `noout` flag and fails if it does not match `expected`.
///
/// Guards against commands that report success without changing state.
pub struct AssertNoout {
    commands: Arc<dyn ClusterCommands>,
    expected: bool,
}

impl AssertNoout {
    /// Expects the flag to be set.
    pub fn set(commands: Arc<dyn ClusterCommands>) -> Self {
        Self {
            commands,
            expected: true,
        }
    }

    /// Expects the flag to be cleared.
    pub fn unset(commands: Arc<dyn ClusterCommands>) -> Self {
        Self {
            commands,
            expected: false,
        }
    }

    fn state_word(set: bool) -> &'static str {
        if set {
            "set"
        } else {
            "unset"
        }
    }
}

#[async_trait]
impl Operation for AssertNoout {
    fn name(&self) -> &'static str {
        if self.expected {
            "assert-noout-set"
        } else {
            "assert-noout-unset"
        }
    }

    fn describe(&self, _node: &str) -> String {
        format!(
            "Assert OSD has 'noout' flag {}.",
            Self::state_word(self.expected)
        )
    }

    async fn execute(&self, _node: &str) -> MaintenanceResult<()> {
        let actual = self.commands.noout_set().await?;
        if actual != self.expected {
            return Err(MaintenanceError::PostCondition(format!(
                "OSD has 'noout' flag {}.",
                Self::state_word(actual)
            )));
        }
        Ok(())
    }
}

/// Takes every storage unit on the node out and down, then stops the local
/// storage daemon service.
///
/// Units must be out before the daemon is stopped, otherwise the cluster
/// sees them fail rather than leave.
pub struct StopStorageUnits {
    inventory: Arc<dyn ClusterInventory>,
    commands: Arc<dyn ClusterCommands>,
}

impl StopStorageUnits {
    /// Builds the step over the given collaborators.
    pub fn new(inventory: Arc<dyn ClusterInventory>, commands: Arc<dyn ClusterCommands>) -> Self {
        Self {
            inventory,
            commands,
        }
    }
}

#[async_trait]
impl Operation for StopStorageUnits {
    fn name(&self) -> &'static str {
        "stop-storage-units"
    }

    fn describe(&self, node: &str) -> String {
        format!("Stop OSD service in node '{}'.", node)
    }

    async fn execute(&self, node: &str) -> MaintenanceResult<()> {
        for unit in units_on(self.inventory.as_ref(), node).await? {
            self.commands.out_storage_unit(unit).await.map_err(|e| {
                warn!(node, unit, "unable to take osd out");
                e
            })?;
            info!(node, unit, "took osd out and down");
        }
        self.commands.stop_service(ServiceKind::StorageDaemon).await?;
        info!(node, "stopped OSD service");
        Ok(())
    }
}

/// Starts the local storage daemon service and brings every unit on the
/// node back in.
pub struct StartStorageUnits {
    inventory: Arc<dyn ClusterInventory>,
    commands: Arc<dyn ClusterCommands>,
}

impl StartStorageUnits {
    /// Builds the step over the given collaborators.
    pub fn new(inventory: Arc<dyn ClusterInventory>, commands: Arc<dyn ClusterCommands>) -> Self {
        Self {
            inventory,
            commands,
        }
    }
}

#[async_trait]
impl Operation for StartStorageUnits {
    fn name(&self) -> &'static str {
        "start-storage-units"
    }

    fn describe(&self, node: &str) -> String {
        format!("Start OSD service in node '{}'.", node)
    }

    async fn execute(&self, node: &str) -> MaintenanceResult<()> {
        self.commands.start_service(ServiceKind::StorageDaemon).await?;
        for unit in units_on(self.inventory.as_ref(), node).await? {
            self.commands.in_storage_unit(unit).await?;
            info!(node, unit, "brought osd back in");
        }
        info!(node, "started OSD service");
        Ok(())
    }
}

/// Stops every mon/mds/mgr service hosted on the node.
pub struct StopControlServices {
    inventory: Arc<dyn ClusterInventory>,
    commands: Arc<dyn ClusterCommands>,
}

impl StopControlServices {
    /// Builds the step over the given collaborators.
    pub fn new(inventory: Arc<dyn ClusterInventory>, commands: Arc<dyn ClusterCommands>) -> Self {
        Self {
            inventory,
            commands,
        }
    }
}

#[async_trait]
impl Operation for StopControlServices {
    fn name(&self) -> &'static str {
        "stop-control-services"
    }

    fn describe(&self, node: &str) -> String {
        format!("Stop non-osd services in node '{}'.", node)
    }

    async fn execute(&self, node: &str) -> MaintenanceResult<()> {
        for kind in control_kinds_on(self.inventory.as_ref(), node).await? {
            self.commands.stop_service(kind).await?;
            info!(node, service = %kind, "stopped service");
        }
        Ok(())
    }
}

/// Starts every mon/mds/mgr service hosted on the node.
pub struct StartControlServices {
    inventory: Arc<dyn ClusterInventory>,
    commands: Arc<dyn ClusterCommands>,
}

impl StartControlServices {
    /// Builds the step over the given collaborators.
    pub fn new(inventory: Arc<dyn ClusterInventory>, commands: Arc<dyn ClusterCommands>) -> Self {
        Self {
            inventory,
            commands,
        }
    }
}

#[async_trait]
impl Operation for StartControlServices {
    fn name(&self) -> &'static str {
        "start-control-services"
    }

    fn describe(&self, node: &str) -> String {
        format!("Start non-osd services in node '{}'.", node)
    }

    async fn execute(&self, node: &str) -> MaintenanceResult<()> {
        for kind in control_kinds_on(self.inventory.as_ref(), node).await? {
            self.commands.start_service(kind).await?;
            info!(node, service = %kind, "started service");
        }
        Ok(())
    }
}

/// Distinct control-plane kinds registered on `node`, in a stable order.
async fn control_kinds_on(
    inventory: &dyn ClusterInventory,
    node: &str,
) -> MaintenanceResult<Vec<ServiceKind>> {
    let mut kinds: Vec<ServiceKind> = inventory
        .services()
        .await?
        .into_iter()
        .filter(|s| s.location == node && s.kind.is_control())
        .map(|s| s.kind)
        .collect();
    kinds.sort();
    kinds.dedup();
    Ok(kinds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCluster;

    #[tokio::test]
    async fn test_set_noout_sets_flag() {
        let cluster = Arc::new(MemoryCluster::new());
        SetNoout::new(cluster.clone()).execute("n").await.unwrap();
        assert!(cluster.noout());
    }

    #[tokio::test]
    async fn test_set_noout_idempotent() {
        let cluster = Arc::new(MemoryCluster::new().with_noout(true));
        SetNoout::new(cluster.clone()).execute("n").await.unwrap();
        assert!(cluster.noout());
    }

    #[tokio::test]
    async fn test_unset_noout_idempotent() {
        let cluster = Arc::new(MemoryCluster::new());
        UnsetNoout::new(cluster.clone()).execute("n").await.unwrap();
        assert!(!cluster.noout());
    }

    #[tokio::test]
    async fn test_set_noout_command_failure() {
        let cluster = Arc::new(MemoryCluster::new().fail_on("set_noout", "some reasons"));
        let err = SetNoout::new(cluster.clone()).execute("n").await.unwrap_err();
        assert!(err.to_string().contains("some reasons"));
        assert!(!cluster.noout());
    }

    #[tokio::test]
    async fn test_assert_set_passes_and_fails() {
        let cluster = Arc::new(MemoryCluster::new().with_noout(true));
        assert!(AssertNoout::set(cluster.clone()).execute("n").await.is_ok());
        let err = AssertNoout::unset(cluster.clone()).execute("n").await.unwrap_err();
        assert_eq!(err, MaintenanceError::PostCondition("OSD has 'noout' flag set.".to_string()));
    }

    #[tokio::test]
    async fn test_assert_unset_fails_when_set_silently_ignored() {
        let cluster = Arc::new(MemoryCluster::new().ignore_noout_changes());
        SetNoout::new(cluster.clone()).execute("n").await.unwrap();
        let err = AssertNoout::set(cluster.clone()).execute("n").await.unwrap_err();
        assert!(err.to_string().contains("unset"));
    }

    #[tokio::test]
    async fn test_assert_query_failure() {
        let cluster = Arc::new(MemoryCluster::new().fail_on("noout_set", "some reasons"));
        assert!(AssertNoout::unset(cluster).execute("n").await.is_err());
    }

    #[test]
    fn test_noout_descriptions() {
        let cluster = Arc::new(MemoryCluster::new());
        assert_eq!(SetNoout::new(cluster.clone()).describe("n"), "Run `ceph osd set noout`.");
        assert_eq!(
            AssertNoout::unset(cluster).describe("n"),
            "Assert OSD has 'noout' flag unset."
        );
    }

    #[tokio::test]
    async fn test_stop_storage_units_outs_before_stopping_daemon() {
        let cluster = Arc::new(
            MemoryCluster::new()
                .with_unit(1, "node-0")
                .with_unit(2, "node-1")
                .with_unit(3, "node-0"),
        );
        StopStorageUnits::new(cluster.clone(), cluster.clone())
            .execute("node-0")
            .await
            .unwrap();

        assert_eq!(cluster.out_units(), vec![1, 3]);
        assert_eq!(
            cluster.mutating_calls(),
            vec![
                "out_storage_unit(1)".to_string(),
                "out_storage_unit(3)".to_string(),
                "stop_service(osd)".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_storage_units_failure_surfaces() {
        let cluster = Arc::new(
            MemoryCluster::new()
                .with_unit(1, "node-0")
                .fail_on("out_storage_unit", "some reasons"),
        );
        let err = StopStorageUnits::new(cluster.clone(), cluster.clone())
            .execute("node-0")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("out_storage_unit"));
        assert!(cluster.stopped_services().is_empty());
    }

    #[tokio::test]
    async fn test_start_storage_units_brings_units_in() {
        let cluster = Arc::new(
            MemoryCluster::new()
                .with_unit(1, "node-0")
                .with_unit(3, "node-0"),
        );
        StopStorageUnits::new(cluster.clone(), cluster.clone())
            .execute("node-0")
            .await
            .unwrap();
        StartStorageUnits::new(cluster.clone(), cluster.clone())
            .execute("node-0")
            .await
            .unwrap();

        assert!(cluster.out_units().is_empty());
        assert!(cluster.stopped_services().is_empty());
    }

    #[tokio::test]
    async fn test_start_storage_units_failure() {
        let cluster = Arc::new(MemoryCluster::new().fail_on("start_service", "some reasons"));
        let err = StartStorageUnits::new(cluster.clone(), cluster)
            .execute("node-0")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("some reasons"));
    }

    #[tokio::test]
    async fn test_control_services_stop_and_start() {
        let cluster = Arc::new(
            MemoryCluster::new()
                .with_service(ServiceKind::Monitor, "node-0")
                .with_service(ServiceKind::Manager, "node-0")
                .with_service(ServiceKind::StorageDaemon, "node-0")
                .with_service(ServiceKind::MetadataServer, "node-1"),
        );
        StopControlServices::new(cluster.clone(), cluster.clone())
            .execute("node-0")
            .await
            .unwrap();
        assert_eq!(
            cluster.stopped_services(),
            vec![ServiceKind::Monitor, ServiceKind::Manager]
        );

        StartControlServices::new(cluster.clone(), cluster.clone())
            .execute("node-0")
            .await
            .unwrap();
        assert!(cluster.stopped_services().is_empty());
    }
}
