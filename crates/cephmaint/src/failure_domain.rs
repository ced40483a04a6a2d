//! Automatic adjustment of the data-placement failure domain.
//!
//! Small clusters cannot spread replicas across hosts once one host is in
//! maintenance. Entering maintenance on a cluster of at most
//! `failure_domain_threshold` members downgrades the automatic host-level
//! rule to the storage-unit-level rule; exiting on a cluster of at least that
//! many members upgrades it back. Operator-defined rules are never touched.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::commands::ClusterCommands;
use crate::config::MaintenanceConfig;
use crate::error::{MaintenanceError, MaintenanceResult};
use crate::inventory::ClusterInventory;
use crate::operation::Operation;

/// Level at which replicas are spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureDomain {
    /// Replicas on distinct hosts.
    Host,
    /// Replicas on distinct OSDs.
    #[serde(rename = "osd")]
    StorageUnit,
}

impl FailureDomain {
    /// CRUSH bucket type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureDomain::Host => "host",
            FailureDomain::StorageUnit => "osd",
        }
    }

    /// Name of the automatic rule for this domain.
    pub fn auto_rule<'a>(&self, config: &'a MaintenanceConfig) -> &'a str {
        match self {
            FailureDomain::Host => &config.auto_host_rule,
            FailureDomain::StorageUnit => &config.auto_unit_rule,
        }
    }
}

impl std::fmt::Display for FailureDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which way a switch goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchDirection {
    /// Host to storage unit, when a node enters maintenance.
    Downgrade,
    /// Storage unit to host, when a node exits maintenance.
    Upgrade,
}

impl SwitchDirection {
    /// Domain the switch leaves.
    pub fn from(&self) -> FailureDomain {
        match self {
            SwitchDirection::Downgrade => FailureDomain::Host,
            SwitchDirection::Upgrade => FailureDomain::StorageUnit,
        }
    }

    /// Domain the switch lands on.
    pub fn to(&self) -> FailureDomain {
        match self {
            SwitchDirection::Downgrade => FailureDomain::StorageUnit,
            SwitchDirection::Upgrade => FailureDomain::Host,
        }
    }

    /// Whether a cluster of `members` nodes needs the switch.
    pub fn required(&self, members: usize, threshold: usize) -> bool {
        match self {
            SwitchDirection::Downgrade => members <= threshold,
            SwitchDirection::Upgrade => members >= threshold,
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            SwitchDirection::Downgrade => "Downgrade",
            SwitchDirection::Upgrade => "Upgrade",
        }
    }
}

impl std::fmt::Display for SwitchDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.verb())
    }
}

/// What a failure-domain step decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchDecision {
    /// Active rule is not the automatic source rule (already switched, or custom).
    NotApplicable,
    /// Membership does not call for a switch.
    NotRequired,
    /// Switch needed and confirmed.
    Switch,
    /// Switch needed but the operator did not confirm it.
    Unconfirmed,
}

/// Switches the automatic placement rule when cluster size requires it.
pub struct SwitchFailureDomain {
    inventory: Arc<dyn ClusterInventory>,
    commands: Arc<dyn ClusterCommands>,
    direction: SwitchDirection,
    source_rule: String,
    threshold: usize,
    confirmed: bool,
}

impl SwitchFailureDomain {
    /// `confirmed` carries the operator's consent for a required switch.
    pub fn new(
        inventory: Arc<dyn ClusterInventory>,
        commands: Arc<dyn ClusterCommands>,
        config: &MaintenanceConfig,
        direction: SwitchDirection,
        confirmed: bool,
    ) -> Self {
        Self {
            inventory,
            commands,
            direction,
            source_rule: direction.from().auto_rule(config).to_string(),
            threshold: config.failure_domain_threshold,
            confirmed,
        }
    }

    /// Which way this step switches.
    pub fn direction(&self) -> SwitchDirection {
        self.direction
    }

    /// Reads cluster state and decides without mutating anything.
    pub async fn decide(&self) -> MaintenanceResult<SwitchDecision> {
        let active = self.commands.default_rule_id().await?;
        let source = self.commands.rule_id(&self.source_rule).await?;
        if active != source {
            return Ok(SwitchDecision::NotApplicable);
        }

        let members = self.inventory.members().await?.len();
        if !self.direction.required(members, self.threshold) {
            return Ok(SwitchDecision::NotRequired);
        }

        Ok(if self.confirmed {
            SwitchDecision::Switch
        } else {
            SwitchDecision::Unconfirmed
        })
    }
}

#[async_trait]
impl Operation for SwitchFailureDomain {
    fn name(&self) -> &'static str {
        match self.direction {
            SwitchDirection::Downgrade => "downgrade-failure-domain",
            SwitchDirection::Upgrade => "upgrade-failure-domain",
        }
    }

    fn describe(&self, _node: &str) -> String {
        format!(
            "{} failure domain from '{}' to '{}' if required and confirmed.",
            self.direction,
            self.direction.from(),
            self.direction.to()
        )
    }

    async fn execute(&self, node: &str) -> MaintenanceResult<()> {
        let (from, to) = (self.direction.from(), self.direction.to());
        match self.decide().await? {
            SwitchDecision::NotApplicable => {
                debug!(node, rule = %self.source_rule, "active rule is not the automatic source rule, leaving it alone");
                Ok(())
            }
            SwitchDecision::NotRequired => {
                debug!(node, "no need to {} failure domain", self.direction.verb().to_lowercase());
                Ok(())
            }
            SwitchDecision::Unconfirmed => Err(MaintenanceError::Unconfirmed {
                from,
                to,
                direction: self.direction,
            }),
            SwitchDecision::Switch => {
                self.commands.switch_failure_domain(from, to).await?;
                info!(node, %from, %to, "{}d failure domain", self.direction.verb());
                Ok(())
            }
        }
    }
}
