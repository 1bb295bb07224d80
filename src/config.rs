// src/config.rs - Configuration structures for nodes and off-normal alarms

use crate::{
    address_space::NodeRef,
    alarm::{AlarmKind, InitialEvaluation},
    bootstrap::{BaseAlarmOptions, OffNormalOptions, MAX_SEVERITY, MIN_SEVERITY},
    error::{AlarmError, Result},
    node_id::NodeId,
    value::{DataValue, QualityCode, Value},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

// ============================================================================
// MAIN CONFIGURATION
// ============================================================================

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Value-bearing nodes to seed into the address space
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    /// Off-normal alarm definitions
    #[serde(default)]
    pub alarms: Vec<AlarmDefinition>,
}

impl Config {
    /// Load and validate a YAML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_yaml(&content)
    }

    /// Parse and validate a YAML configuration document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ids and severities.
    ///
    /// Missing alarm references are left to alarm construction, which reports
    /// them as precondition violations.
    pub fn validate(&self) -> Result<()> {
        let mut node_ids = HashSet::new();
        for node in &self.nodes {
            let id = node.node_id()?;
            if !node_ids.insert(id) {
                return Err(AlarmError::Config(format!("Duplicate node id: {}", node.id)));
            }
        }

        let mut alarm_ids = HashSet::new();
        let mut alarm_names = HashSet::new();
        for alarm in &self.alarms {
            let id = alarm.node_id()?;
            if node_ids.contains(&id) || !alarm_ids.insert(id) {
                return Err(AlarmError::Config(format!("Duplicate alarm id: {}", alarm.id)));
            }
            if !alarm_names.insert(alarm.name.as_str()) {
                return Err(AlarmError::Config(format!("Duplicate alarm name: {}", alarm.name)));
            }
            if !(MIN_SEVERITY..=MAX_SEVERITY).contains(&alarm.severity) {
                return Err(AlarmError::Config(format!(
                    "Alarm '{}' severity {} must be within {}..={}",
                    alarm.name, alarm.severity, MIN_SEVERITY, MAX_SEVERITY
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// NODES
// ============================================================================

/// A variable node in the address space
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node id text, e.g. `ns=2;s=Pump1.Running`
    pub id: String,

    /// Browse name (defaults to the id text)
    #[serde(default)]
    pub browse_name: Option<String>,

    /// Initial value; absent means null
    #[serde(default)]
    pub value: Option<Value>,

    /// Initial quality (good, uncertain or bad)
    #[serde(default)]
    pub quality: QualityCode,
}

impl NodeConfig {
    pub fn node_id(&self) -> Result<NodeId> {
        self.id.parse()
    }

    pub fn browse_name(&self) -> &str {
        self.browse_name.as_deref().unwrap_or(&self.id)
    }

    pub fn initial_value(&self) -> DataValue {
        DataValue::new(self.value.clone(), self.quality.into())
    }
}

// ============================================================================
// ALARMS
// ============================================================================

/// An off-normal alarm definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmDefinition {
    /// Node id of the alarm object
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub kind: AlarmKind,

    /// Input node id or browse name
    #[serde(default)]
    pub input_node: Option<String>,

    /// Normal-state node id or browse name
    #[serde(default)]
    pub normal_state: Option<String>,

    #[serde(default = "default_severity")]
    pub severity: u16,

    #[serde(default)]
    pub initial_evaluation: InitialEvaluation,
}

impl AlarmDefinition {
    pub fn node_id(&self) -> Result<NodeId> {
        self.id.parse()
    }

    pub fn base_options(&self) -> Result<BaseAlarmOptions> {
        Ok(BaseAlarmOptions::new(self.node_id()?, self.name.clone())
            .with_kind(self.kind)
            .with_severity(self.severity))
    }

    pub fn off_normal_options(&self) -> OffNormalOptions {
        OffNormalOptions {
            input_node: self.input_node.clone().map(NodeRef::from),
            normal_state: self.normal_state.clone().map(NodeRef::from),
            initial_evaluation: self.initial_evaluation,
        }
    }
}

// ============================================================================
// DEFAULT VALUE FUNCTIONS
// ============================================================================

fn default_severity() -> u16 { crate::bootstrap::DEFAULT_SEVERITY }
