//! Maintenance thresholds, loadable from TOML or JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::inventory::ServiceKind;

/// Thresholds and rule names used when building maintenance plans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Monitors that must remain outside a node in maintenance.
    pub min_monitors: usize,
    /// Metadata servers that must remain outside the node.
    pub min_metadata_servers: usize,
    /// Managers that must remain outside the node.
    pub min_managers: usize,
    /// Automatic rule that spreads replicas across hosts.
    pub auto_host_rule: String,
    /// Automatic rule that spreads replicas across storage units.
    pub auto_unit_rule: String,
    /// Member count at which the failure domain switches between the two rules.
    pub failure_domain_threshold: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            min_monitors: 3,
            min_metadata_servers: 1,
            min_managers: 1,
            auto_host_rule: String::from("microceph_auto_host"),
            auto_unit_rule: String::from("microceph_auto_osd"),
            failure_domain_threshold: 3,
        }
    }
}

impl MaintenanceConfig {
    /// Loads a `.toml` or `.json` file and validates it.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: MaintenanceConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects empty or identical rule names and a zero monitor minimum.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.auto_host_rule.is_empty() || self.auto_unit_rule.is_empty() {
            anyhow::bail!("automatic rule names must not be empty");
        }
        if self.auto_host_rule == self.auto_unit_rule {
            anyhow::bail!(
                "host and unit rules must differ, both are '{}'",
                self.auto_host_rule
            );
        }
        if self.min_monitors == 0 {
            anyhow::bail!("min_monitors must be at least 1");
        }
        Ok(())
    }

    /// Minimum number of `kind` services that must remain outside a node in
    /// maintenance. Storage daemons are not counted.
    pub fn minimum_for(&self, kind: ServiceKind) -> usize {
        match kind {
            ServiceKind::Monitor => self.min_monitors,
            ServiceKind::MetadataServer => self.min_metadata_servers,
            ServiceKind::Manager => self.min_managers,
            ServiceKind::StorageDaemon => 0,
        }
    }
}
