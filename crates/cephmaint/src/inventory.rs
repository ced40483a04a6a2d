//! Read-only view of cluster membership, storage units and control services.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClusterResult;

/// Kinds of daemons a cluster member can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ServiceKind {
    /// Quorum monitor.
    #[serde(rename = "mon")]
    Monitor,
    /// Metadata server.
    #[serde(rename = "mds")]
    MetadataServer,
    /// Manager.
    #[serde(rename = "mgr")]
    Manager,
    /// Storage daemon.
    #[serde(rename = "osd")]
    StorageDaemon,
}

impl ServiceKind {
    /// Control-plane kinds subject to minimum-count checks, in reporting order.
    pub const CONTROL: [ServiceKind; 3] = [
        ServiceKind::Monitor,
        ServiceKind::MetadataServer,
        ServiceKind::Manager,
    ];

    /// Short daemon name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Monitor => "mon",
            ServiceKind::MetadataServer => "mds",
            ServiceKind::Manager => "mgr",
            ServiceKind::StorageDaemon => "osd",
        }
    }

    /// mon, mds and mgr; not OSDs.
    pub fn is_control(&self) -> bool {
        !matches!(self, ServiceKind::StorageDaemon)
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A storage unit (OSD) and the member it lives on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUnit {
    /// OSD id.
    pub id: u64,
    /// Hosting node.
    pub location: String,
}

impl StorageUnit {
    /// Record hosted on `location`.
    pub fn new(id: u64, location: impl Into<String>) -> Self {
        Self {
            id,
            location: location.into(),
        }
    }
}

/// A daemon instance and the member it lives on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlService {
    /// Service kind.
    pub kind: ServiceKind,
    /// Hosting node.
    pub location: String,
}

impl ControlService {
    /// Record hosted on `location`.
    pub fn new(kind: ServiceKind, location: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
        }
    }
}

/// Read-only cluster inventory.
///
/// Implementations typically query the membership database; every record is
/// tagged with the member it resides on.
#[async_trait]
pub trait ClusterInventory: Send + Sync {
    /// Names of all cluster members.
    async fn members(&self) -> ClusterResult<Vec<String>>;

    /// Every storage unit in the cluster.
    async fn storage_units(&self) -> ClusterResult<Vec<StorageUnit>>;

    /// Every daemon registered in the cluster.
    async fn services(&self) -> ClusterResult<Vec<ControlService>>;
}

/// Ids of the storage units located on `node`, in inventory order.
pub async fn units_on(inventory: &dyn ClusterInventory, node: &str) -> ClusterResult<Vec<u64>> {
    Ok(inventory
        .storage_units()
        .await?
        .into_iter()
        .filter(|unit| unit.location == node)
        .map(|unit| unit.id)
        .collect())
}
