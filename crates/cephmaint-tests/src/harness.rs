//! Test Harness - cluster fixtures and tracing setup

use cephmaint::{MaintenanceConfig, MaintenanceOrchestrator, MemoryCluster, ServiceKind};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a test-friendly subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(EnvFilter::from_default_env())
        .try_init();
}

/// Describes a cluster topology and builds a [`MemoryCluster`] from it.
#[derive(Debug, Clone)]
pub struct ClusterFixture {
    nodes: Vec<String>,
    units_per_node: u64,
    services: Vec<(ServiceKind, String)>,
}

impl ClusterFixture {
    /// `count` members named `node-0..`, each with `units_per_node` OSDs and
    /// no control services.
    pub fn new(count: usize, units_per_node: u64) -> Self {
        Self {
            nodes: (0..count).map(|i| format!("node-{}", i)).collect(),
            units_per_node,
            services: Vec::new(),
        }
    }

    /// Four members: a monitor everywhere, mds and mgr on node-0 and node-1.
    pub fn four_node() -> Self {
        Self::new(4, 2)
            .with_service_on_all(ServiceKind::Monitor)
            .with_service(ServiceKind::MetadataServer, "node-0")
            .with_service(ServiceKind::MetadataServer, "node-1")
            .with_service(ServiceKind::Manager, "node-0")
            .with_service(ServiceKind::Manager, "node-1")
    }

    /// Three members, each running mon, mds and mgr.
    pub fn three_node() -> Self {
        Self::new(3, 1)
            .with_service_on_all(ServiceKind::Monitor)
            .with_service_on_all(ServiceKind::MetadataServer)
            .with_service_on_all(ServiceKind::Manager)
    }

    pub fn with_service(mut self, kind: ServiceKind, node: &str) -> Self {
        self.services.push((kind, node.to_string()));
        self
    }

    pub fn with_service_on_all(mut self, kind: ServiceKind) -> Self {
        for node in &self.nodes {
            self.services.push((kind, node.clone()));
        }
        self
    }

    /// Drops the first `kind` service registered on `node`.
    pub fn without_service(mut self, kind: ServiceKind, node: &str) -> Self {
        if let Some(pos) = self
            .services
            .iter()
            .position(|(k, n)| *k == kind && n == node)
        {
            self.services.remove(pos);
        }
        self
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// OSD ids hosted on `node`.
    pub fn units_of(&self, node: &str) -> Vec<u64> {
        self.nodes
            .iter()
            .position(|n| n == node)
            .map(|idx| {
                let first = idx as u64 * self.units_per_node;
                (first..first + self.units_per_node).collect()
            })
            .unwrap_or_default()
    }

    pub fn build(&self) -> MemoryCluster {
        let names: Vec<&str> = self.nodes.iter().map(|n| n.as_str()).collect();
        let mut cluster = MemoryCluster::new().with_members(&names);
        for node in &self.nodes {
            for id in self.units_of(node) {
                cluster = cluster.with_unit(id, node);
            }
        }
        for (kind, node) in &self.services {
            cluster = cluster.with_service(*kind, node);
        }
        cluster
    }
}

/// Orchestrator with default thresholds wired to `cluster` for both roles.
pub fn orchestrator(cluster: &Arc<MemoryCluster>) -> MaintenanceOrchestrator {
    MaintenanceOrchestrator::new(cluster.clone(), cluster.clone())
}

/// Orchestrator with explicit thresholds.
pub fn orchestrator_with(
    cluster: &Arc<MemoryCluster>,
    config: MaintenanceConfig,
) -> MaintenanceOrchestrator {
    MaintenanceOrchestrator::with_config(cluster.clone(), cluster.clone(), config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cephmaint::ClusterInventory;

    #[test]
    fn test_fixture_unit_numbering() {
        let fixture = ClusterFixture::new(3, 2);
        assert_eq!(fixture.units_of("node-0"), vec![0, 1]);
        assert_eq!(fixture.units_of("node-2"), vec![4, 5]);
        assert!(fixture.units_of("node-9").is_empty());
    }

    #[tokio::test]
    async fn test_four_node_build() {
        let cluster = ClusterFixture::four_node().build();
        assert_eq!(cluster.members().await.unwrap().len(), 4);
        assert_eq!(cluster.storage_units().await.unwrap().len(), 8);
        assert_eq!(cluster.services().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_without_service() {
        let cluster = ClusterFixture::three_node()
            .without_service(ServiceKind::Manager, "node-1")
            .build();
        let services = cluster.services().await.unwrap();
        assert_eq!(
            services.iter().filter(|s| s.kind == ServiceKind::Manager).count(),
            2
        );
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        init_tracing();
    }
}
