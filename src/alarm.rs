// src/alarm.rs - Off-normal alarm instance and its state machine
//
// An off-normal alarm is active while its input node's value differs from the
// value of its normal-state node. Both nodes are monitored independently; every
// usable delivery on either stream runs the same comparator and the same
// transition/emission path.

use crate::{
    address_space::AddressSpace,
    comparator::{evaluate, TransitionName},
    condition::{ConditionEvent, ConditionEventSink},
    error::{AlarmError, Result},
    monitor::{classify, Delivery, IgnoreReason, MonitorHandle, Stream, StreamObserver},
    node_id::NodeId,
    value::{DataValue, Value},
};
use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

#[cfg(feature = "normal-state-repoint")]
use crate::{address_space::NodeRef, monitor, resolver::resolve};

/// Variant tag distinguishing the members of the off-normal family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlarmKind {
    /// Input differs from its expected value
    #[default]
    OffNormal,
    /// The subsystem supplying alarm data may be unreachable, so condition
    /// state for that subsystem may be stale or incomplete
    SystemOffNormal,
}

impl AlarmKind {
    /// Browse name of the alarm type
    pub fn type_name(&self) -> &'static str {
        match self {
            AlarmKind::OffNormal => "OffNormalAlarmType",
            AlarmKind::SystemOffNormal => "SystemOffNormalAlarmType",
        }
    }

    /// Node id of the alarm type in namespace 0
    pub fn type_id(&self) -> NodeId {
        match self {
            AlarmKind::OffNormal => NodeId::numeric(0, 10637),
            AlarmKind::SystemOffNormal => NodeId::numeric(0, 11753),
        }
    }
}

impl fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// How the starting active state is established at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InitialEvaluation {
    /// Read both nodes' current values (same quality/null policy as
    /// deliveries) before the first comparator run
    #[default]
    ReadCurrent,
    /// Run the comparator with both values unknown; the alarm always starts
    /// inactive and only reacts to the first deliveries
    AssumeUnknown,
}

/// Counters kept per alarm
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlarmStats {
    /// Comparator runs
    pub evaluations: u64,
    /// Real active/inactive transitions
    pub transitions: u64,
    /// Value change deliveries dropped for bad quality or null value. Reads
    /// made at construction or on re-point are not counted.
    pub ignored_deliveries: u64,
}

/// Alarm summary for display
#[derive(Debug, Clone, Serialize)]
pub struct AlarmSummary {
    pub name: String,
    pub node_id: NodeId,
    pub kind: AlarmKind,
    pub severity: u16,
    pub active: bool,
    pub input_node: NodeId,
    pub normal_state_node: NodeId,
    pub last_input_value: Option<Value>,
    pub last_normal_value: Option<Value>,
    pub stats: AlarmStats,
}

/// Fields of the base discrete alarm: the alarm object node and its
/// properties in the address space.
#[derive(Debug, Clone)]
pub struct DiscreteAlarm {
    pub node_id: NodeId,
    pub name: String,
    pub kind: AlarmKind,
    pub severity: u16,
    pub active_state_property: NodeId,
    pub normal_state_property: NodeId,
    pub input_node_property: NodeId,
}

#[derive(Debug)]
struct AlarmState {
    input_ref: NodeId,
    normal_state_ref: NodeId,
    last_input: Option<Value>,
    last_normal: Option<Value>,
    active: bool,
    stats: AlarmStats,
}

/// Shared part of an alarm, referenced by both monitor callbacks
pub(crate) struct AlarmCore {
    base: DiscreteAlarm,
    policy: InitialEvaluation,
    space: AddressSpace,
    sink: Arc<dyn ConditionEventSink>,
    state: Mutex<AlarmState>,
    /// Serializes ActiveState property writes
    mirror: ReentrantMutex<()>,
}

impl AlarmCore {
    pub(crate) fn new(
        base: DiscreteAlarm,
        policy: InitialEvaluation,
        space: AddressSpace,
        sink: Arc<dyn ConditionEventSink>,
        input_ref: NodeId,
        normal_state_ref: NodeId,
    ) -> Self {
        Self {
            base,
            policy,
            space,
            sink,
            state: Mutex::new(AlarmState {
                input_ref,
                normal_state_ref,
                last_input: None,
                last_normal: None,
                active: false,
                stats: AlarmStats::default(),
            }),
            mirror: ReentrantMutex::new(()),
        }
    }

    /// Establish the starting state according to the initial evaluation policy
    pub(crate) fn initialize(&self) {
        let transitioned = {
            let mut state = self.state.lock();
            if self.policy == InitialEvaluation::ReadCurrent {
                let input = state.input_ref.clone();
                let normal = state.normal_state_ref.clone();
                state.last_input = self.read_usable(Stream::Input, &input);
                state.last_normal = self.read_usable(Stream::NormalState, &normal);
            }
            self.run_comparator(&mut state)
        };
        self.mirror_active_state(transitioned);
    }

    fn read_usable(&self, stream: Stream, node: &NodeId) -> Option<Value> {
        let current = match self.space.read(node) {
            Ok(current) => current,
            Err(e) => {
                warn!("Alarm '{}': cannot read {} node {}: {}", self.base.name, stream, node, e);
                return None;
            }
        };
        match classify(&current) {
            Delivery::Usable(value) => Some(value.clone()),
            Delivery::Ignored(reason) => {
                debug!(
                    "Alarm '{}': current {} value unusable ({:?})",
                    self.base.name, stream, reason
                );
                None
            }
        }
    }

    /// Single path for every state change: comparator, transition, emission.
    /// Returns the new active state when a transition happened.
    fn run_comparator(&self, state: &mut AlarmState) -> Option<bool> {
        state.stats.evaluations += 1;
        let eval = evaluate(state.last_normal.as_ref(), state.last_input.as_ref(), state.active);
        state.active = eval.active;

        let transition = match eval.transition {
            Some(transition) => transition,
            None => {
                trace!("Alarm '{}' unchanged (active: {})", self.base.name, state.active);
                return None;
            }
        };
        state.stats.transitions += 1;

        match transition {
            TransitionName::Active => warn!(
                "Alarm '{}' active: input {:?} differs from normal state {:?}",
                self.base.name, state.last_input, state.last_normal
            ),
            TransitionName::Inactive => info!("Alarm '{}' returned to normal", self.base.name),
        }

        let event = ConditionEvent::new(
            self.base.node_id.clone(),
            self.base.name.clone(),
            self.base.kind,
            self.base.severity,
            transition,
        );
        if let Err(e) = self.sink.signal_new_condition(&event) {
            warn!("Alarm '{}': failed to signal condition: {}", self.base.name, e);
        }
        Some(eval.active)
    }

    /// Copy the current active state into the ActiveState property after a
    /// transition. The state is re-read under the mirror lock so the last
    /// write always carries the latest state.
    fn mirror_active_state(&self, transitioned: Option<bool>) {
        if transitioned.is_none() {
            return;
        }
        let _mirror = self.mirror.lock();
        let active = self.state.lock().active;
        if let Err(e) = self
            .space
            .write_value_from_source(&self.base.active_state_property, DataValue::good(active))
        {
            warn!("Alarm '{}': cannot update ActiveState: {}", self.base.name, e);
        }
    }

    #[cfg(feature = "normal-state-repoint")]
    fn reset_normal_state(&self, normal_state_ref: NodeId) {
        let transitioned = {
            let mut state = self.state.lock();
            let last_normal = match self.policy {
                InitialEvaluation::ReadCurrent => self.read_usable(Stream::NormalState, &normal_state_ref),
                InitialEvaluation::AssumeUnknown => None,
            };
            state.normal_state_ref = normal_state_ref;
            state.last_normal = last_normal;
            self.run_comparator(&mut state)
        };
        self.mirror_active_state(transitioned);
    }
}

impl StreamObserver for AlarmCore {
    fn on_value(&self, stream: Stream, value: &Value) {
        let transitioned = {
            let mut state = self.state.lock();
            debug!("Alarm '{}': {} = {}", self.base.name, stream, value);
            match stream {
                Stream::Input => state.last_input = Some(value.clone()),
                Stream::NormalState => state.last_normal = Some(value.clone()),
            }
            self.run_comparator(&mut state)
        };
        self.mirror_active_state(transitioned);
    }

    fn on_ignored(&self, _stream: Stream, _reason: IgnoreReason) {
        self.state.lock().stats.ignored_deliveries += 1;
    }
}

/// A live off-normal (or system off-normal) alarm.
///
/// Created by [`crate::bootstrap::instantiate`]. Dropping it removes both
/// value change subscriptions; [`dispose`](Self::dispose) additionally removes
/// the alarm object from the address space.
pub struct OffNormalAlarm {
    core: Arc<AlarmCore>,
    input_monitor: Option<MonitorHandle>,
    normal_monitor: Option<MonitorHandle>,
}

impl OffNormalAlarm {
    pub(crate) fn new(core: Arc<AlarmCore>, input_monitor: MonitorHandle, normal_monitor: MonitorHandle) -> Self {
        Self {
            core,
            input_monitor: Some(input_monitor),
            normal_monitor: Some(normal_monitor),
        }
    }

    pub fn name(&self) -> &str {
        &self.core.base.name
    }

    /// Alarm object node
    pub fn node_id(&self) -> &NodeId {
        &self.core.base.node_id
    }

    pub fn kind(&self) -> AlarmKind {
        self.core.base.kind
    }

    pub fn severity(&self) -> u16 {
        self.core.base.severity
    }

    pub fn base(&self) -> &DiscreteAlarm {
        &self.core.base
    }

    pub fn initial_evaluation(&self) -> InitialEvaluation {
        self.core.policy
    }

    pub fn is_active(&self) -> bool {
        self.core.state.lock().active
    }

    pub fn input_node(&self) -> NodeId {
        self.core.state.lock().input_ref.clone()
    }

    pub fn normal_state_node(&self) -> NodeId {
        self.core.state.lock().normal_state_ref.clone()
    }

    pub fn last_input_value(&self) -> Option<Value> {
        self.core.state.lock().last_input.clone()
    }

    pub fn last_normal_value(&self) -> Option<Value> {
        self.core.state.lock().last_normal.clone()
    }

    pub fn stats(&self) -> AlarmStats {
        self.core.state.lock().stats
    }

    pub fn summary(&self) -> AlarmSummary {
        let state = self.core.state.lock();
        AlarmSummary {
            name: self.core.base.name.clone(),
            node_id: self.core.base.node_id.clone(),
            kind: self.core.base.kind,
            severity: self.core.base.severity,
            active: state.active,
            input_node: state.input_ref.clone(),
            normal_state_node: state.normal_state_ref.clone(),
            last_input_value: state.last_input.clone(),
            last_normal_value: state.last_normal.clone(),
            stats: state.stats,
        }
    }

    /// Writing through to the normal-state node is not supported; this always
    /// fails and leaves the alarm untouched.
    pub fn set_normal_state_value(&self, _value: Value) -> Result<()> {
        Err(AlarmError::UnsupportedOperation("setNormalStateValue"))
    }

    /// Point the alarm at a different normal-state node.
    ///
    /// The new node is resolved and subscribed before anything is changed, then
    /// its id is persisted into the `NormalState` property. If any of these
    /// steps fails the new subscription is dropped and the alarm keeps its
    /// current wiring. On success the old subscription is released and the
    /// comparator runs against the new node's value.
    #[cfg(feature = "normal-state-repoint")]
    pub fn repoint_normal_state(&mut self, reference: impl Into<NodeRef>) -> Result<()> {
        let reference = reference.into();
        let entity = resolve(&self.core.space, &reference)?;
        let new_id = entity.id().clone();

        let monitor = monitor::subscribe(&entity, Stream::NormalState, self.core.clone())?;
        self.core.space.write_value_from_source(
            &self.core.base.normal_state_property,
            DataValue::good(Value::NodeId(new_id.clone())),
        )?;

        if let Some(old) = self.normal_monitor.replace(monitor) {
            old.dispose();
        }

        info!("Alarm '{}' normal state re-pointed to {}", self.name(), new_id);
        self.core.reset_normal_state(new_id);
        Ok(())
    }

    /// Remove both subscriptions and the alarm object from the address space
    pub fn dispose(mut self) -> Result<()> {
        self.release_monitors();
        info!("Alarm '{}' disposed", self.name());
        match self.core.space.remove_subtree(&self.core.base.node_id) {
            Ok(()) | Err(AlarmError::NodeNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn release_monitors(&mut self) {
        if let Some(monitor) = self.input_monitor.take() {
            monitor.dispose();
        }
        if let Some(monitor) = self.normal_monitor.take() {
            monitor.dispose();
        }
    }
}

impl Drop for OffNormalAlarm {
    fn drop(&mut self) {
        self.release_monitors();
    }
}

impl fmt::Debug for OffNormalAlarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffNormalAlarm")
            .field("name", &self.core.base.name)
            .field("kind", &self.core.base.kind)
            .field("active", &self.is_active())
            .finish()
    }
}
