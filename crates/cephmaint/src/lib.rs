#![warn(missing_docs)]

//! Maintenance orchestration for storage cluster members.
//!
//! Moves one member into and out of maintenance without compromising
//! availability: preflight safety checks (OSD ok-to-stop, mon/mds/mgr counts),
//! the `noout` flag with post-condition assertions, OSD drain and restore,
//! and automatic failure-domain adjustment for small clusters. Plans can be
//! previewed (dry run), limited to their checks (check only), or forced past
//! failed checks.

pub mod actions;
pub mod checks;
pub mod commands;
pub mod config;
pub mod error;
pub mod failure_domain;
pub mod inventory;
pub mod memory;
pub mod operation;
pub mod orchestrator;
pub mod request;
pub mod runner;

pub use commands::{ClusterCommands, RuleId};
pub use config::MaintenanceConfig;
pub use error::{ClusterError, ClusterResult, MaintenanceError, MaintenanceResult, ServiceShortfall};
pub use failure_domain::{FailureDomain, SwitchDecision, SwitchDirection, SwitchFailureDomain};
pub use inventory::{ClusterInventory, ControlService, ServiceKind, StorageUnit};
pub use memory::MemoryCluster;
pub use operation::{OpResult, Operation};
pub use orchestrator::{EnterOptions, ExitOptions, MaintenanceOrchestrator, MaintenancePlan};
pub use request::{
    MaintenanceEnterFlags, MaintenanceFlags, MaintenanceRequest, MaintenanceResponse,
    MaintenanceStatus,
};
pub use runner::OperationRunner;
