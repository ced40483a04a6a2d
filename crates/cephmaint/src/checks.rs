//! Read-only safety predicates run before any mutation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::commands::ClusterCommands;
use crate::config::MaintenanceConfig;
use crate::error::{format_units, MaintenanceError, MaintenanceResult, ServiceShortfall};
use crate::inventory::{units_on, ClusterInventory, ServiceKind};
use crate::operation::Operation;

/// Fails unless the node is a cluster member.
pub struct CheckNodeInCluster {
    inventory: Arc<dyn ClusterInventory>,
}

impl CheckNodeInCluster {
    /// Builds the check.
    pub fn new(inventory: Arc<dyn ClusterInventory>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl Operation for CheckNodeInCluster {
    fn name(&self) -> &'static str {
        "check-node-in-cluster"
    }

    fn describe(&self, node: &str) -> String {
        format!("Check if node '{}' is in the cluster.", node)
    }

    async fn execute(&self, node: &str) -> MaintenanceResult<()> {
        let members = self.inventory.members().await?;
        if members.iter().any(|m| m == node) {
            debug!(node, "node is a cluster member");
            Ok(())
        } else {
            Err(MaintenanceError::NodeNotFound(node.to_string()))
        }
    }
}

/// Fails if any storage unit on the node would break redundancy when stopped.
pub struct CheckOkToStopStorageUnits {
    inventory: Arc<dyn ClusterInventory>,
    commands: Arc<dyn ClusterCommands>,
}

impl CheckOkToStopStorageUnits {
    /// Builds the check.
    pub fn new(inventory: Arc<dyn ClusterInventory>, commands: Arc<dyn ClusterCommands>) -> Self {
        Self {
            inventory,
            commands,
        }
    }
}

#[async_trait]
impl Operation for CheckOkToStopStorageUnits {
    fn name(&self) -> &'static str {
        "check-ok-to-stop"
    }

    fn describe(&self, node: &str) -> String {
        format!("Check if osds in node '{}' are ok-to-stop.", node)
    }

    async fn execute(&self, node: &str) -> MaintenanceResult<()> {
        let units = units_on(self.inventory.as_ref(), node).await?;

        let mut unsafe_units = Vec::new();
        for &unit in &units {
            if !self.commands.ok_to_stop(unit).await? {
                unsafe_units.push(unit);
            }
        }

        if !unsafe_units.is_empty() {
            return Err(MaintenanceError::UnsafeToStop {
                units: unsafe_units,
            });
        }
        if !units.is_empty() {
            info!(node, "{} can be safely stopped", format_units(&units));
        }
        Ok(())
    }
}

/// Fails if the mon/mds/mgr services left outside the node fall below the
/// configured minimums.
///
/// The node's own services are excluded: the question is whether the cluster
/// stays healthy once the node is gone, not whether it is healthy now.
pub struct CheckNonStorageServiceQuorum {
    inventory: Arc<dyn ClusterInventory>,
    minimums: [(ServiceKind, usize); 3],
}

impl CheckNonStorageServiceQuorum {
    /// Builds the check.
    pub fn new(inventory: Arc<dyn ClusterInventory>, config: &MaintenanceConfig) -> Self {
        Self {
            inventory,
            minimums: ServiceKind::CONTROL.map(|kind| (kind, config.minimum_for(kind))),
        }
    }

    fn minimum(&self, kind: ServiceKind) -> usize {
        self.minimums
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, min)| *min)
            .unwrap_or(0)
    }
}

#[async_trait]
impl Operation for CheckNonStorageServiceQuorum {
    fn name(&self) -> &'static str {
        "check-service-quorum"
    }

    fn describe(&self, node: &str) -> String {
        format!(
            "Check if there are at least {} mon, {} mds, and {} mgr services in the cluster besides those in node '{}'",
            self.minimum(ServiceKind::Monitor),
            self.minimum(ServiceKind::MetadataServer),
            self.minimum(ServiceKind::Manager),
            node
        )
    }

    async fn execute(&self, node: &str) -> MaintenanceResult<()> {
        let services = self.inventory.services().await?;

        let mut remaining: HashMap<ServiceKind, usize> = HashMap::new();
        for service in services
            .iter()
            .filter(|s| s.kind.is_control() && s.location != node)
        {
            *remaining.entry(service.kind).or_insert(0) += 1;
        }

        let shortfalls: Vec<ServiceShortfall> = self
            .minimums
            .iter()
            .filter_map(|&(kind, required)| {
                let left = remaining.get(&kind).copied().unwrap_or(0);
                (left < required).then_some(ServiceShortfall {
                    kind,
                    required,
                    remaining: left,
                })
            })
            .collect();

        if !shortfalls.is_empty() {
            return Err(MaintenanceError::InsufficientServices {
                node: node.to_string(),
                shortfalls,
            });
        }

        info!(
            node,
            mon = remaining.get(&ServiceKind::Monitor).copied().unwrap_or(0),
            mds = remaining.get(&ServiceKind::MetadataServer).copied().unwrap_or(0),
            mgr = remaining.get(&ServiceKind::Manager).copied().unwrap_or(0),
            "remaining services are enough"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClusterError;
    use crate::memory::MemoryCluster;

    fn arcs(cluster: MemoryCluster) -> (Arc<MemoryCluster>, Arc<dyn ClusterInventory>, Arc<dyn ClusterCommands>) {
        let cluster = Arc::new(cluster);
        (cluster.clone(), cluster.clone(), cluster)
    }

    #[tokio::test]
    async fn test_node_in_cluster() {
        let (_, inv, _) = arcs(MemoryCluster::new().with_members(&["node-0", "node-1"]));
        let op = CheckNodeInCluster::new(inv);
        assert!(op.execute("node-0").await.is_ok());
    }

    #[tokio::test]
    async fn test_node_not_in_cluster() {
        let (_, inv, _) = arcs(MemoryCluster::new().with_members(&["node-0", "node-1"]));
        let op = CheckNodeInCluster::new(inv);
        let err = op.execute("node-2").await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_node_in_cluster_inventory_error() {
        let (_, inv, _) = arcs(MemoryCluster::new().fail_on("members", "some reasons"));
        let op = CheckNodeInCluster::new(inv);
        let err = op.execute("node-0").await.unwrap_err();
        assert_eq!(
            err,
            MaintenanceError::Cluster(ClusterError::Inventory("members: some reasons".to_string()))
        );
    }

    #[tokio::test]
    async fn test_ok_to_stop_passes() {
        let (_, inv, cmd) = arcs(
            MemoryCluster::new()
                .with_unit(1, "node-0")
                .with_unit(2, "node-1")
                .with_unsafe_unit(2),
        );
        let op = CheckOkToStopStorageUnits::new(inv, cmd);
        assert!(op.execute("node-0").await.is_ok());
    }

    #[tokio::test]
    async fn test_ok_to_stop_names_failing_units() {
        let (_, inv, cmd) = arcs(
            MemoryCluster::new()
                .with_unit(1, "node-0")
                .with_unit(3, "node-0")
                .with_unit(4, "node-0")
                .with_unsafe_unit(1)
                .with_unsafe_unit(4),
        );
        let op = CheckOkToStopStorageUnits::new(inv, cmd);
        let err = op.execute("node-0").await.unwrap_err();
        assert_eq!(err, MaintenanceError::UnsafeToStop { units: vec![1, 4] });
        assert!(err.to_string().contains("cannot be safely stopped"));
    }

    #[tokio::test]
    async fn test_ok_to_stop_node_without_units() {
        let (cluster, inv, cmd) = arcs(MemoryCluster::new().with_unit(1, "node-1"));
        let op = CheckOkToStopStorageUnits::new(inv, cmd);
        assert!(op.execute("node-0").await.is_ok());
        assert!(cluster.calls().iter().all(|c| !c.starts_with("ok_to_stop")));
    }

    #[tokio::test]
    async fn test_ok_to_stop_inventory_error() {
        let (_, inv, cmd) = arcs(MemoryCluster::new().fail_on("storage_units", "some reasons"));
        let op = CheckOkToStopStorageUnits::new(inv, cmd);
        let err = op.execute("node-0").await.unwrap_err();
        assert!(matches!(err, MaintenanceError::Cluster(ClusterError::Inventory(_))));
    }

    fn quorum_cluster() -> MemoryCluster {
        MemoryCluster::new()
            .with_service(ServiceKind::Monitor, "node-0")
            .with_service(ServiceKind::Monitor, "node-1")
            .with_service(ServiceKind::Monitor, "node-2")
            .with_service(ServiceKind::Monitor, "node-3")
            .with_service(ServiceKind::MetadataServer, "node-0")
            .with_service(ServiceKind::MetadataServer, "node-1")
            .with_service(ServiceKind::Manager, "node-0")
            .with_service(ServiceKind::Manager, "node-2")
    }

    #[tokio::test]
    async fn test_quorum_enough_after_exclusion() {
        let (_, inv, _) = arcs(quorum_cluster());
        let op = CheckNonStorageServiceQuorum::new(inv, &MaintenanceConfig::default());
        assert!(op.execute("node-0").await.is_ok());
    }

    #[tokio::test]
    async fn test_quorum_counts_exclude_target_node() {
        let cluster = MemoryCluster::new()
            .with_service(ServiceKind::Monitor, "node-0")
            .with_service(ServiceKind::Monitor, "node-1")
            .with_service(ServiceKind::Monitor, "node-2")
            .with_service(ServiceKind::MetadataServer, "node-1")
            .with_service(ServiceKind::Manager, "node-1");
        let (_, inv, _) = arcs(cluster);
        let op = CheckNonStorageServiceQuorum::new(inv, &MaintenanceConfig::default());

        // healthy now, but only 2 monitors once node-0 leaves
        let err = op.execute("node-0").await.unwrap_err();
        match err {
            MaintenanceError::InsufficientServices { shortfalls, .. } => {
                assert_eq!(shortfalls.len(), 1);
                assert_eq!(shortfalls[0].kind, ServiceKind::Monitor);
                assert_eq!(shortfalls[0].remaining, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_quorum_ignores_storage_daemons() {
        let cluster = quorum_cluster()
            .with_service(ServiceKind::StorageDaemon, "node-0")
            .with_service(ServiceKind::StorageDaemon, "node-1");
        let (_, inv, _) = arcs(cluster);
        let op = CheckNonStorageServiceQuorum::new(inv, &MaintenanceConfig::default());
        assert!(op.execute("node-0").await.is_ok());
    }

    #[tokio::test]
    async fn test_quorum_custom_minimums() {
        let (_, inv, _) = arcs(quorum_cluster());
        let config = MaintenanceConfig {
            min_managers: 2,
            ..MaintenanceConfig::default()
        };
        let op = CheckNonStorageServiceQuorum::new(inv, &config);
        assert!(op.describe("node-0").contains("at least 3 mon, 1 mds, and 2 mgr"));
        let err = op.execute("node-0").await.unwrap_err();
        assert!(err.to_string().contains("mgr (need 2, 1 remaining)"));
    }

    #[tokio::test]
    async fn test_quorum_inventory_error() {
        let (_, inv, _) = arcs(MemoryCluster::new().fail_on("services", "some reasons"));
        let op = CheckNonStorageServiceQuorum::new(inv, &MaintenanceConfig::default());
        let err = op.execute("node-0").await.unwrap_err();
        assert!(err.to_string().contains("some reasons"));
    }
}
