// src/bootstrap.rs - Construction of off-normal alarms
//
// Construction order:
//   1. precondition check (no side effects yet)
//   2. base discrete-alarm object and properties
//   3. resolve input and normal-state references
//   4. persist resolved ids into the alarm properties
//   5. install both monitors
//   6. initial evaluation
use crate::{
    address_space::{AddressSpace, NodeRef},
    alarm::{AlarmCore, AlarmKind, DiscreteAlarm, InitialEvaluation, OffNormalAlarm},
    condition::ConditionEventSink,
    error::{AlarmError, Result},
    monitor::{self, Stream},
    node_id::NodeId,
    resolver::resolve,
    value::{DataValue, Value},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_SEVERITY: u16 = 500;
pub const MIN_SEVERITY: u16 = 1;
pub const MAX_SEVERITY: u16 = 1000;

/// Options of the base discrete alarm
#[derive(Debug, Clone)]
pub struct BaseAlarmOptions {
    /// Id of the alarm object node to create
    pub node_id: NodeId,
    pub name: String,
    pub kind: AlarmKind,
    pub severity: u16,
}

impl BaseAlarmOptions {
    pub fn new(node_id: NodeId, name: impl Into<String>) -> Self {
        Self {
            node_id,
            name: name.into(),
            kind: AlarmKind::OffNormal,
            severity: DEFAULT_SEVERITY,
        }
    }

    pub fn with_kind(mut self, kind: AlarmKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_severity(mut self, severity: u16) -> Self {
        self.severity = severity;
        self
    }
}

/// Off-normal specific options. Both references are required.
#[derive(Debug, Clone, Default)]
pub struct OffNormalOptions {
    pub input_node: Option<NodeRef>,
    pub normal_state: Option<NodeRef>,
    pub initial_evaluation: InitialEvaluation,
}

impl OffNormalOptions {
    pub fn new(input_node: impl Into<NodeRef>, normal_state: impl Into<NodeRef>) -> Self {
        Self {
            input_node: Some(input_node.into()),
            normal_state: Some(normal_state.into()),
            initial_evaluation: InitialEvaluation::default(),
        }
    }

    pub fn with_initial_evaluation(mut self, policy: InitialEvaluation) -> Self {
        self.initial_evaluation = policy;
        self
    }
}

/// Create the alarm object node and its properties.
///
/// `NormalState` and `InputNode` start out null and are filled in once the
/// references are resolved.
pub fn base_instantiate(space: &AddressSpace, options: &BaseAlarmOptions) -> Result<DiscreteAlarm> {
    space.add_object(options.node_id.clone(), options.name.clone())?;

    let built = (|| -> Result<DiscreteAlarm> {
        let active = space.add_property(&options.node_id, "ActiveState", DataValue::good(false))?;
        let normal = space.add_property(&options.node_id, "NormalState", DataValue::null())?;
        let input = space.add_property(&options.node_id, "InputNode", DataValue::null())?;
        space.add_property(
            &options.node_id,
            "Severity",
            DataValue::good(i64::from(options.severity)),
        )?;
        Ok(DiscreteAlarm {
            node_id: options.node_id.clone(),
            name: options.name.clone(),
            kind: options.kind,
            severity: options.severity,
            active_state_property: active.id().clone(),
            normal_state_property: normal.id().clone(),
            input_node_property: input.id().clone(),
        })
    })();

    if built.is_err() {
        discard(space, &options.node_id);
    }
    built
}

/// Build a live off-normal alarm.
///
/// Fails with [`AlarmError::PreconditionViolation`] before touching the
/// address space when a reference is missing or the severity is out of range.
/// A reference that does not resolve fails with [`AlarmError::Resolution`];
/// the alarm object created so far is removed again.
///
/// # Examples
///
/// ```rust
/// use offnormal::bootstrap::{instantiate, BaseAlarmOptions, OffNormalOptions};
/// use offnormal::{AddressSpace, DataValue, LoggingSink, NodeId};
/// use std::sync::Arc;
///
/// let space = AddressSpace::new();
/// space.add_variable(NodeId::string(2, "In"), "In", DataValue::good(7i64))?;
/// space.add_variable(NodeId::string(2, "Normal"), "Normal", DataValue::good(42i64))?;
///
/// let alarm = instantiate(
///     &space,
///     BaseAlarmOptions::new(NodeId::string(1, "Alarm"), "Alarm"),
///     OffNormalOptions::new("In", "Normal"),
///     Arc::new(LoggingSink),
/// )?;
/// assert!(alarm.is_active());
/// # Ok::<(), offnormal::AlarmError>(())
/// ```
pub fn instantiate(
    space: &AddressSpace,
    base: BaseAlarmOptions,
    options: OffNormalOptions,
    sink: Arc<dyn ConditionEventSink>,
) -> Result<OffNormalAlarm> {
    let (input_ref, normal_ref) = check_preconditions(&base, &options)?;

    let discrete = base_instantiate(space, &base)?;
    match wire(space, discrete, input_ref, normal_ref, options.initial_evaluation, sink) {
        Ok(alarm) => Ok(alarm),
        Err(e) => {
            warn!("Failed to build alarm '{}': {}", base.name, e);
            discard(space, &base.node_id);
            Err(e)
        }
    }
}

/// Build a live system off-normal alarm. Same behavior as [`instantiate`]
/// with the kind forced to [`AlarmKind::SystemOffNormal`].
pub fn instantiate_system(
    space: &AddressSpace,
    base: BaseAlarmOptions,
    options: OffNormalOptions,
    sink: Arc<dyn ConditionEventSink>,
) -> Result<OffNormalAlarm> {
    instantiate(space, base.with_kind(AlarmKind::SystemOffNormal), options, sink)
}

fn check_preconditions(base: &BaseAlarmOptions, options: &OffNormalOptions) -> Result<(NodeRef, NodeRef)> {
    let input = options.input_node.clone().ok_or_else(|| {
        AlarmError::PreconditionViolation(format!("alarm '{}': inputNode is required", base.name))
    })?;
    let normal = options.normal_state.clone().ok_or_else(|| {
        AlarmError::PreconditionViolation(format!("alarm '{}': normalState is required", base.name))
    })?;
    if !(MIN_SEVERITY..=MAX_SEVERITY).contains(&base.severity) {
        return Err(AlarmError::PreconditionViolation(format!(
            "alarm '{}': severity {} outside {}..={}",
            base.name, base.severity, MIN_SEVERITY, MAX_SEVERITY
        )));
    }
    Ok((input, normal))
}

fn wire(
    space: &AddressSpace,
    discrete: DiscreteAlarm,
    input_ref: NodeRef,
    normal_ref: NodeRef,
    policy: InitialEvaluation,
    sink: Arc<dyn ConditionEventSink>,
) -> Result<OffNormalAlarm> {
    let input = resolve(space, &input_ref)?;
    let normal = resolve(space, &normal_ref)?;

    space.write_value_from_source(
        &discrete.normal_state_property,
        DataValue::good(Value::NodeId(normal.id().clone())),
    )?;
    space.write_value_from_source(
        &discrete.input_node_property,
        DataValue::good(Value::NodeId(input.id().clone())),
    )?;

    let name = discrete.name.clone();
    let kind = discrete.kind;
    let core = Arc::new(AlarmCore::new(
        discrete,
        policy,
        space.clone(),
        sink,
        input.id().clone(),
        normal.id().clone(),
    ));

    let input_monitor = monitor::subscribe(&input, Stream::Input, core.clone())?;
    let normal_monitor = monitor::subscribe(&normal, Stream::NormalState, core.clone())?;
    debug!("Alarm '{}' monitoring {} and {}", name, input.id(), normal.id());

    core.initialize();
    let alarm = OffNormalAlarm::new(core, input_monitor, normal_monitor);

    info!(
        "Alarm '{}' ({}) created: input {}, normal state {}, initial evaluation {:?}, active {}",
        name,
        kind,
        input.id(),
        normal.id(),
        policy,
        alarm.is_active()
    );
    Ok(alarm)
}

fn discard(space: &AddressSpace, node_id: &NodeId) {
    if let Err(e) = space.remove_subtree(node_id) {
        debug!("Cleanup of {} skipped: {}", node_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::LoggingSink;

    fn space() -> AddressSpace {
        let space = AddressSpace::new();
        space.add_variable(NodeId::string(2, "In"), "In", DataValue::good(1i64)).unwrap();
        space.add_variable(NodeId::string(2, "Normal"), "Normal", DataValue::good(1i64)).unwrap();
        space
    }

    fn base() -> BaseAlarmOptions {
        BaseAlarmOptions::new(NodeId::string(1, "Alarm"), "Alarm")
    }

    #[test]
    fn test_base_instantiate_properties() {
        let space = AddressSpace::new();
        let alarm = base_instantiate(&space, &base().with_severity(800)).unwrap();
        assert_eq!(space.children(&alarm.node_id).unwrap().len(), 4);
        assert_eq!(space.read(&alarm.active_state_property).unwrap().value, Some(Value::Bool(false)));
        assert!(space.read(&alarm.normal_state_property).unwrap().data_type_is_null());
        assert_eq!(
            space.read(&alarm.node_id.child("Severity")).unwrap().value,
            Some(Value::Int(800))
        );
        assert!(matches!(
            base_instantiate(&space, &base()),
            Err(AlarmError::DuplicateNode(_))
        ));
    }

    #[test]
    fn test_missing_references() {
        let space = space();
        let before = space.len();
        for options in [
            OffNormalOptions {
                input_node: None,
                ..OffNormalOptions::new("In", "Normal")
            },
            OffNormalOptions {
                normal_state: None,
                ..OffNormalOptions::new("In", "Normal")
            },
        ] {
            let err = instantiate(&space, base(), options, Arc::new(LoggingSink)).unwrap_err();
            assert!(matches!(err, AlarmError::PreconditionViolation(_)));
        }
        assert_eq!(space.len(), before);
    }

    #[test]
    fn test_severity_range() {
        let space = space();
        let err = instantiate(
            &space,
            base().with_severity(0),
            OffNormalOptions::new("In", "Normal"),
            Arc::new(LoggingSink),
        )
        .unwrap_err();
        assert!(matches!(err, AlarmError::PreconditionViolation(_)));
        assert!(!space.contains(&NodeId::string(1, "Alarm")));
    }

    #[test]
    fn test_resolution_failure_cleans_up() {
        let space = space();
        let before = space.len();
        let err = instantiate(
            &space,
            base(),
            OffNormalOptions::new("In", "ns=2;s=Missing"),
            Arc::new(LoggingSink),
        )
        .unwrap_err();
        assert!(matches!(err, AlarmError::Resolution { .. }));
        assert_eq!(space.len(), before);
        assert_eq!(space.subscriber_count(&NodeId::string(2, "In")), 0);
    }

    #[test]
    fn test_persists_resolved_ids() {
        let space = space();
        let alarm = instantiate(
            &space,
            base(),
            OffNormalOptions::new("In", "Normal"),
            Arc::new(LoggingSink),
        )
        .unwrap();
        let normal = space.read(&alarm.base().normal_state_property).unwrap();
        assert_eq!(normal.value, Some(Value::NodeId(NodeId::string(2, "Normal"))));
        let input = space.read(&alarm.base().input_node_property).unwrap();
        assert_eq!(input.value, Some(Value::NodeId(NodeId::string(2, "In"))));
        assert!(!alarm.is_active());
    }

    #[test]
    fn test_system_variant() {
        let space = space();
        let alarm = instantiate_system(
            &space,
            base(),
            OffNormalOptions::new("In", "Normal"),
            Arc::new(LoggingSink),
        )
        .unwrap();
        assert_eq!(alarm.kind(), AlarmKind::SystemOffNormal);
    }
}
