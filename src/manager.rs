// src/manager.rs - Owns the alarms built from a configuration
use crate::{
    address_space::AddressSpace,
    alarm::{AlarmSummary, OffNormalAlarm},
    bootstrap::{instantiate, BaseAlarmOptions, OffNormalOptions},
    condition::ConditionEventSink,
    config::Config,
    error::{AlarmError, Result},
};
use std::sync::Arc;
use tracing::{error, info};

/// Collection of live alarms sharing one address space and one event sink
pub struct AlarmManager {
    space: AddressSpace,
    sink: Arc<dyn ConditionEventSink>,
    alarms: Vec<OffNormalAlarm>,
}

impl AlarmManager {
    pub fn new(space: AddressSpace, sink: Arc<dyn ConditionEventSink>) -> Self {
        Self {
            space,
            sink,
            alarms: Vec::new(),
        }
    }

    /// Seed the configured nodes into `space` and build every configured alarm.
    ///
    /// The first failure aborts; alarms built before it are disposed. Nodes
    /// seeded before the failure stay in the address space.
    pub fn from_config(
        space: AddressSpace,
        config: &Config,
        sink: Arc<dyn ConditionEventSink>,
    ) -> Result<Self> {
        for node in &config.nodes {
            space.add_variable(node.node_id()?, node.browse_name(), node.initial_value())?;
        }

        let mut manager = Self::new(space, sink);
        for definition in &config.alarms {
            let built = definition
                .base_options()
                .and_then(|base| manager.add_alarm(base, definition.off_normal_options()).map(|_| ()));
            if let Err(e) = built {
                error!("Alarm '{}' could not be built: {}", definition.name, e);
                manager.shutdown();
                return Err(e);
            }
        }

        info!(
            "Alarm manager started with {} nodes and {} alarms",
            config.nodes.len(),
            manager.alarms.len()
        );
        Ok(manager)
    }

    /// Build one more alarm on the manager's address space and sink
    pub fn add_alarm(&mut self, base: BaseAlarmOptions, options: OffNormalOptions) -> Result<&OffNormalAlarm> {
        if self.alarm(&base.name).is_some() {
            return Err(AlarmError::Config(format!("Duplicate alarm name: {}", base.name)));
        }
        let alarm = instantiate(&self.space, base, options, self.sink.clone())?;
        self.alarms.push(alarm);
        let last = self.alarms.len() - 1;
        Ok(&self.alarms[last])
    }

    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn alarm(&self, name: &str) -> Option<&OffNormalAlarm> {
        self.alarms.iter().find(|alarm| alarm.name() == name)
    }

    pub fn alarms(&self) -> &[OffNormalAlarm] {
        &self.alarms
    }

    /// Alarms currently in the active state
    pub fn active_alarms(&self) -> Vec<&OffNormalAlarm> {
        self.alarms.iter().filter(|alarm| alarm.is_active()).collect()
    }

    pub fn summaries(&self) -> Vec<AlarmSummary> {
        self.alarms.iter().map(OffNormalAlarm::summary).collect()
    }

    /// Dispose every alarm, removing subscriptions and alarm objects
    pub fn shutdown(&mut self) {
        let count = self.alarms.len();
        for alarm in self.alarms.drain(..) {
            let name = alarm.name().to_string();
            if let Err(e) = alarm.dispose() {
                error!("Failed to dispose alarm '{}': {}", name, e);
            }
        }
        if count > 0 {
            info!("Alarm manager stopped, {} alarms disposed", count);
        }
    }
}

impl Drop for AlarmManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ChannelSink;
    use crate::node_id::NodeId;
    use crate::value::{DataValue, Value};

    const CONFIG: &str = r#"
nodes:
  - id: "ns=2;s=Valve.Open"
    value: { type: Bool, value: false }
  - id: "ns=2;s=Valve.Expected"
    browse_name: "Valve.Expected"
    value: { type: Bool, value: true }
alarms:
  - id: "ns=1;s=Valve.OffNormal"
    name: "ValveOffNormal"
    input_node: "ns=2;s=Valve.Open"
    normal_state: "Valve.Expected"
"#;

    #[test]
    fn test_from_config() {
        let config = Config::from_yaml(CONFIG).unwrap();
        let (sink, mut rx) = ChannelSink::channel();
        let space = AddressSpace::new();
        let manager = AlarmManager::from_config(space.clone(), &config, Arc::new(sink)).unwrap();

        assert_eq!(manager.alarms().len(), 1);
        assert_eq!(manager.active_alarms().len(), 1);
        assert!(rx.try_recv().unwrap().is_active);

        space
            .write_value_from_source(&NodeId::string(2, "Valve.Open"), DataValue::good(true))
            .unwrap();
        assert!(manager.active_alarms().is_empty());
        let alarm = manager.alarm("ValveOffNormal").unwrap();
        assert_eq!(alarm.last_input_value(), Some(Value::Bool(true)));
        assert!(!rx.try_recv().unwrap().is_active);
    }

    #[test]
    fn test_fail_fast_disposes_built_alarms() {
        let yaml = format!(
            "{}  - id: \"ns=1;s=Broken\"\n    name: \"Broken\"\n    input_node: \"ns=2;s=Valve.Open\"\n",
            CONFIG
        );
        let config = Config::from_yaml(&yaml).unwrap();
        let space = AddressSpace::new();
        let err = AlarmManager::from_config(space.clone(), &config, Arc::new(ChannelSink::channel().0))
            .err()
            .unwrap();
        assert!(matches!(err, AlarmError::PreconditionViolation(_)));
        assert!(!space.contains(&NodeId::string(1, "Valve.OffNormal")));
        assert_eq!(space.subscriber_count(&NodeId::string(2, "Valve.Open")), 0);
    }

    #[test]
    fn test_shutdown_removes_alarm_objects() {
        let config = Config::from_yaml(CONFIG).unwrap();
        let space = AddressSpace::new();
        let mut manager =
            AlarmManager::from_config(space.clone(), &config, Arc::new(ChannelSink::channel().0)).unwrap();
        manager.shutdown();
        assert!(manager.alarms().is_empty());
        assert_eq!(space.len(), 2);
    }
}
