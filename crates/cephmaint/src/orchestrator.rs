//! Builds and drives the enter/exit maintenance plans.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::actions::{
    AssertNoout, SetNoout, StartControlServices, StartStorageUnits, StopControlServices,
    StopStorageUnits, UnsetNoout,
};
use crate::checks::{CheckNodeInCluster, CheckNonStorageServiceQuorum, CheckOkToStopStorageUnits};
use crate::commands::ClusterCommands;
use crate::config::MaintenanceConfig;
use crate::error::{MaintenanceError, MaintenanceResult};
use crate::failure_domain::{SwitchDirection, SwitchFailureDomain};
use crate::inventory::ClusterInventory;
use crate::operation::{any_failed, OpResult, Operation};
use crate::runner::OperationRunner;

/// Operator flags for entering maintenance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnterOptions {
    /// Run the action phase even if preflight checks fail.
    pub force: bool,
    /// Describe every step without executing it.
    pub dry_run: bool,
    /// Set and verify the cluster-wide `noout` flag.
    pub set_noout: bool,
    /// Take the node's OSDs out and stop the OSD service.
    pub stop_storage_units: bool,
    /// Run only the preflight phase.
    pub check_only: bool,
    /// Allow switching placement from host to OSD level.
    pub confirm_failure_domain_downgrade: bool,
    /// Also stop mon/mds/mgr services hosted on the node.
    pub stop_control_services: bool,
}

/// Operator flags for exiting maintenance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitOptions {
    /// Describe every step without executing it.
    pub dry_run: bool,
    /// Run only the preflight phase.
    pub check_only: bool,
    /// Allow switching placement from OSD back to host level.
    pub confirm_failure_domain_upgrade: bool,
    /// Also start mon/mds/mgr services hosted on the node.
    pub start_control_services: bool,
}

/// A plan split into the read-only checks and the mutating steps.
pub struct MaintenancePlan {
    /// Read-only safety checks.
    pub preflight: Vec<Box<dyn Operation>>,
    /// Mutating steps, run only after the checks pass or under `force`.
    pub actions: Vec<Box<dyn Operation>>,
}

impl MaintenancePlan {
    /// Total number of operations in both phases.
    pub fn len(&self) -> usize {
        self.preflight.len() + self.actions.len()
    }

    /// Whether the plan has no operations at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Operation names in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.preflight
            .iter()
            .chain(self.actions.iter())
            .map(|op| op.name())
            .collect()
    }
}

/// Transitions cluster members into and out of maintenance.
///
/// Holds no mutable state: each call is a function of its arguments and the
/// cluster state reported by the collaborators. Callers must serialize
/// concurrent calls for the same node.
#[derive(Clone)]
pub struct MaintenanceOrchestrator {
    inventory: Arc<dyn ClusterInventory>,
    commands: Arc<dyn ClusterCommands>,
    config: MaintenanceConfig,
}

impl MaintenanceOrchestrator {
    /// Orchestrator with default thresholds and rule names.
    pub fn new(inventory: Arc<dyn ClusterInventory>, commands: Arc<dyn ClusterCommands>) -> Self {
        Self::with_config(inventory, commands, MaintenanceConfig::default())
    }

    /// Orchestrator with explicit thresholds and rule names.
    pub fn with_config(
        inventory: Arc<dyn ClusterInventory>,
        commands: Arc<dyn ClusterCommands>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            inventory,
            commands,
            config,
        }
    }

    /// Thresholds in effect.
    pub fn config(&self) -> &MaintenanceConfig {
        &self.config
    }

    /// Builds the enter plan without running it.
    pub fn enter_plan(&self, opts: &EnterOptions) -> MaintenancePlan {
        let inv = &self.inventory;
        let cmd = &self.commands;

        let preflight: Vec<Box<dyn Operation>> = vec![
            Box::new(CheckNodeInCluster::new(inv.clone())),
            Box::new(CheckOkToStopStorageUnits::new(inv.clone(), cmd.clone())),
            Box::new(CheckNonStorageServiceQuorum::new(inv.clone(), &self.config)),
        ];

        let mut actions: Vec<Box<dyn Operation>> = vec![Box::new(SwitchFailureDomain::new(
            inv.clone(),
            cmd.clone(),
            &self.config,
            SwitchDirection::Downgrade,
            opts.confirm_failure_domain_downgrade,
        ))];
        if opts.set_noout {
            actions.push(Box::new(SetNoout::new(cmd.clone())));
            actions.push(Box::new(AssertNoout::set(cmd.clone())));
        }
        if opts.stop_storage_units {
            actions.push(Box::new(StopStorageUnits::new(inv.clone(), cmd.clone())));
        }
        if opts.stop_control_services {
            actions.push(Box::new(StopControlServices::new(inv.clone(), cmd.clone())));
        }

        MaintenancePlan { preflight, actions }
    }

    /// Builds the exit plan without running it.
    pub fn exit_plan(&self, opts: &ExitOptions) -> MaintenancePlan {
        let inv = &self.inventory;
        let cmd = &self.commands;

        let preflight: Vec<Box<dyn Operation>> = vec![Box::new(CheckNodeInCluster::new(inv.clone()))];

        let mut actions: Vec<Box<dyn Operation>> = vec![
            Box::new(UnsetNoout::new(cmd.clone())),
            Box::new(AssertNoout::unset(cmd.clone())),
            Box::new(StartStorageUnits::new(inv.clone(), cmd.clone())),
        ];
        if opts.start_control_services {
            actions.push(Box::new(StartControlServices::new(inv.clone(), cmd.clone())));
        }
        actions.push(Box::new(SwitchFailureDomain::new(
            inv.clone(),
            cmd.clone(),
            &self.config,
            SwitchDirection::Upgrade,
            opts.confirm_failure_domain_upgrade,
        )));

        MaintenancePlan { preflight, actions }
    }

    /// Puts `node` into maintenance.
    ///
    /// Preflight checks always run. With `check_only` every check runs and
    /// their results are returned alone. A failed check stops the plan unless
    /// `force` is set, in which case the remaining checks still report, the
    /// action phase runs and its results are appended. The action phase
    /// always stops at its first failure.
    /// The `Err` case is reserved for unusable arguments; every expected
    /// failure is reported in the returned results.
    pub async fn enter(&self, node: &str, opts: &EnterOptions) -> MaintenanceResult<Vec<OpResult>> {
        validate_node(node)?;
        let plan = self.enter_plan(opts);
        info!(node, dry_run = opts.dry_run, force = opts.force, "entering maintenance");
        Ok(self
            .drive(node, plan, opts.dry_run, opts.check_only, opts.force)
            .await)
    }

    /// Brings `node` back out of maintenance.
    ///
    /// There is no override: a failed preflight check always stops the plan.
    pub async fn exit(&self, node: &str, opts: &ExitOptions) -> MaintenanceResult<Vec<OpResult>> {
        validate_node(node)?;
        let plan = self.exit_plan(opts);
        info!(node, dry_run = opts.dry_run, "exiting maintenance");
        Ok(self
            .drive(node, plan, opts.dry_run, opts.check_only, false)
            .await)
    }

    async fn drive(
        &self,
        node: &str,
        plan: MaintenancePlan,
        dry_run: bool,
        check_only: bool,
        force: bool,
    ) -> Vec<OpResult> {
        let runner = OperationRunner::new(dry_run);

        // under force or check-only every check reports
        let mut results = runner.run(node, &plan.preflight, force || check_only).await;
        if check_only {
            return results;
        }
        if any_failed(&results) {
            if !force {
                warn!(node, "preflight checks failed, not continuing");
                return results;
            }
            warn!(node, "preflight checks failed, continuing because of force");
        }

        results.extend(runner.run(node, &plan.actions, false).await);
        results
    }
}

fn validate_node(node: &str) -> MaintenanceResult<()> {
    if node.trim().is_empty() {
        return Err(MaintenanceError::InvalidRequest(
            "node name must not be empty".to_string(),
        ));
    }
    Ok(())
}
