// src/condition.rs - Condition events and the sinks that receive them
use crate::{
    alarm::AlarmKind,
    comparator::TransitionName,
    error::{AlarmError, Result},
    node_id::NodeId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Announcement of a real active/inactive transition of an alarm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionEvent {
    pub event_id: Uuid,
    pub time: DateTime<Utc>,
    /// Alarm object node that changed state
    pub source_node: NodeId,
    pub alarm_name: String,
    pub kind: AlarmKind,
    pub severity: u16,
    pub transition: TransitionName,
    pub is_active: bool,
    pub message: String,
}

impl ConditionEvent {
    pub(crate) fn new(
        source_node: NodeId,
        alarm_name: String,
        kind: AlarmKind,
        severity: u16,
        transition: TransitionName,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            time: Utc::now(),
            source_node,
            alarm_name,
            kind,
            severity,
            is_active: transition == TransitionName::Active,
            transition,
            message: String::new(),
        }
    }
}

/// Receiver of condition events, owned by the notification layer.
///
/// Called at most once per real transition, while the alarm's state lock is
/// held: implementations must not call back into the same alarm.
#[cfg_attr(test, mockall::automock)]
pub trait ConditionEventSink: Send + Sync {
    fn signal_new_condition(&self, event: &ConditionEvent) -> Result<()>;
}

/// Forwards events into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ConditionEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<ConditionEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ConditionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ConditionEventSink for ChannelSink {
    fn signal_new_condition(&self, event: &ConditionEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| AlarmError::Notification("condition event channel closed".to_string()))
    }
}

/// Writes events to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSink;

impl ConditionEventSink for LoggingSink {
    fn signal_new_condition(&self, event: &ConditionEvent) -> Result<()> {
        if event.is_active {
            warn!(
                alarm = %event.alarm_name,
                source = %event.source_node,
                severity = event.severity,
                "Condition {} ({:?})",
                event.transition,
                event.kind
            );
        } else {
            info!(
                alarm = %event.alarm_name,
                source = %event.source_node,
                "Condition {} ({:?})",
                event.transition,
                event.kind
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(transition: TransitionName) -> ConditionEvent {
        ConditionEvent::new(
            NodeId::string(1, "Alarm"),
            "Alarm".to_string(),
            AlarmKind::OffNormal,
            500,
            transition,
        )
    }

    #[test]
    fn test_event_fields() {
        let active = event(TransitionName::Active);
        assert!(active.is_active);
        assert_eq!(active.transition.as_str(), "Active");
        assert_eq!(active.message, "");

        let inactive = event(TransitionName::Inactive);
        assert!(!inactive.is_active);
        assert_ne!(active.event_id, inactive.event_id);
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.signal_new_condition(&event(TransitionName::Active)).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.transition, TransitionName::Active);

        drop(rx);
        assert!(sink.signal_new_condition(&event(TransitionName::Inactive)).is_err());
    }

    #[test]
    fn test_event_json() {
        let json = serde_json::to_value(event(TransitionName::Inactive)).unwrap();
        assert_eq!(json["transition"], "Inactive");
        assert_eq!(json["is_active"], false);
        assert_eq!(json["source_node"], "ns=1;s=Alarm");
        assert_eq!(json["kind"], "off_normal");
    }
}
