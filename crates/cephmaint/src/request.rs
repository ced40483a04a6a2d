//! Request and response payloads for the maintenance endpoint.
//!
//! Transport-agnostic: whatever serves `PUT /ops/maintenance/{node}` decodes a
//! [`MaintenanceRequest`], calls [`MaintenanceOrchestrator::apply`] on the
//! target member and encodes the [`MaintenanceResponse`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MaintenanceResult;
use crate::operation::{any_failed, OpResult};
use crate::orchestrator::{EnterOptions, ExitOptions, MaintenanceOrchestrator};

/// Requested end state of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaintenanceStatus {
    /// Enter maintenance.
    Maintenance,
    /// Exit maintenance.
    NonMaintenance,
}

/// Flags shared by both transitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceFlags {
    /// Describe steps without executing them.
    pub dry_run: bool,
    /// Run only the preflight checks.
    pub check_only: bool,
    /// Confirms a failure-domain downgrade (enter) or upgrade (exit).
    pub confirm_failure_domain: bool,
    /// Stop (enter) or start (exit) mon/mds/mgr services on the node.
    pub control_services: bool,
}

/// Flags that only apply when entering maintenance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceEnterFlags {
    /// Continue past failed checks.
    pub force: bool,
    /// Set the `noout` flag.
    pub set_noout: bool,
    /// Take the node's OSDs out and stop them.
    pub stop_osds: bool,
}

/// Body of a maintenance request for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceRequest {
    /// Target state.
    pub status: MaintenanceStatus,
    /// Flags for either transition.
    #[serde(flatten)]
    pub flags: MaintenanceFlags,
    /// Flags for entering only.
    #[serde(flatten)]
    pub enter: MaintenanceEnterFlags,
}

impl MaintenanceRequest {
    /// Request to enter maintenance.
    pub fn enter(flags: MaintenanceFlags, enter: MaintenanceEnterFlags) -> Self {
        Self {
            status: MaintenanceStatus::Maintenance,
            flags,
            enter,
        }
    }

    /// Request to exit maintenance.
    pub fn exit(flags: MaintenanceFlags) -> Self {
        Self {
            status: MaintenanceStatus::NonMaintenance,
            flags,
            enter: MaintenanceEnterFlags::default(),
        }
    }

    /// Options for [`MaintenanceOrchestrator::enter`].
    pub fn enter_options(&self) -> EnterOptions {
        EnterOptions {
            force: self.enter.force,
            dry_run: self.flags.dry_run,
            set_noout: self.enter.set_noout,
            stop_storage_units: self.enter.stop_osds,
            check_only: self.flags.check_only,
            confirm_failure_domain_downgrade: self.flags.confirm_failure_domain,
            stop_control_services: self.flags.control_services,
        }
    }

    /// Options for [`MaintenanceOrchestrator::exit`].
    pub fn exit_options(&self) -> ExitOptions {
        ExitOptions {
            dry_run: self.flags.dry_run,
            check_only: self.flags.check_only,
            confirm_failure_domain_upgrade: self.flags.confirm_failure_domain,
            start_control_services: self.flags.control_services,
        }
    }

    /// Whether `results` count as success for this request. Errors are
    /// tolerated only on a forced enter.
    ///
    /// MicroCeph's `PUT /ops/maintenance/{node}` handler also tolerates
    /// errors on an exit request carrying `force`. Exit has no override
    /// here, so a stray `force` on an exit request is ignored and any error
    /// fails it.
    pub fn succeeded(&self, results: &[OpResult]) -> bool {
        let forced = self.status == MaintenanceStatus::Maintenance && self.enter.force;
        forced || !any_failed(results)
    }
}

/// Outcome of a maintenance request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceResponse {
    /// Whether the request counts as successful.
    pub success: bool,
    /// Per-step results in execution order.
    pub results: Vec<OpResult>,
}

impl MaintenanceOrchestrator {
    /// Dispatches a decoded request to [`enter`](Self::enter) or
    /// [`exit`](Self::exit).
    pub async fn apply(
        &self,
        node: &str,
        request: &MaintenanceRequest,
    ) -> MaintenanceResult<MaintenanceResponse> {
        debug!(node, status = ?request.status, "maintenance request");
        let results = match request.status {
            MaintenanceStatus::Maintenance => self.enter(node, &request.enter_options()).await?,
            MaintenanceStatus::NonMaintenance => self.exit(node, &request.exit_options()).await?,
        };
        Ok(MaintenanceResponse {
            success: request.succeeded(&results),
            results,
        })
    }
}
