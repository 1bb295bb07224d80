// src/monitor.rs - Value change monitoring with the quality/null filter
use crate::{
    address_space::{NodeHandle, SubscriptionHandle},
    error::Result,
    node_id::NodeId,
    value::{DataValue, Quality, Value},
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// The two monitored streams of an off-normal alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Input,
    NormalState,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Input => f.write_str("input"),
            Stream::NormalState => f.write_str("normal state"),
        }
    }
}

/// Why a delivery was dropped before reaching the observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    BadQuality(Quality),
    NullValue,
}

/// Result of applying the delivery policy to a [`DataValue`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delivery<'a> {
    Usable(&'a Value),
    Ignored(IgnoreReason),
}

/// Delivery policy shared by both streams: anything that is not good quality
/// is ignored, then anything whose data type is null.
pub fn classify(update: &DataValue) -> Delivery<'_> {
    if !update.quality.is_good() {
        return Delivery::Ignored(IgnoreReason::BadQuality(update.quality));
    }
    match &update.value {
        Some(value) => Delivery::Usable(value),
        None => Delivery::Ignored(IgnoreReason::NullValue),
    }
}

/// Receives filtered deliveries from a monitored node
pub trait StreamObserver: Send + Sync + 'static {
    /// A good-quality, non-null value arrived on `stream`
    fn on_value(&self, stream: Stream, value: &Value);

    /// A delivery was dropped by the policy
    fn on_ignored(&self, _stream: Stream, _reason: IgnoreReason) {}
}

/// Live subscription of an observer on one node
#[derive(Debug)]
pub struct MonitorHandle {
    stream: Stream,
    subscription: SubscriptionHandle,
}

impl MonitorHandle {
    pub fn stream(&self) -> Stream {
        self.stream
    }

    pub fn node(&self) -> &NodeId {
        self.subscription.node()
    }

    /// Remove the subscription
    pub fn dispose(self) {
        self.subscription.unsubscribe();
    }
}

/// Subscribe `observer` to value changes of `entity`, tagging every delivery
/// with `stream`.
pub fn subscribe<O: StreamObserver>(
    entity: &NodeHandle,
    stream: Stream,
    observer: Arc<O>,
) -> Result<MonitorHandle> {
    let node = entity.id().clone();
    let subscription = entity.subscribe_to_value_change(move |update: &DataValue| {
        match classify(update) {
            Delivery::Usable(value) => observer.on_value(stream, value),
            Delivery::Ignored(reason) => {
                trace!("Ignoring {} delivery from {}: {:?}", stream, node, reason);
                observer.on_ignored(stream, reason);
            }
        }
    })?;
    Ok(MonitorHandle { stream, subscription })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::AddressSpace;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        values: Mutex<Vec<(Stream, Value)>>,
        ignored: Mutex<Vec<(Stream, IgnoreReason)>>,
    }

    impl StreamObserver for Recorder {
        fn on_value(&self, stream: Stream, value: &Value) {
            self.values.lock().push((stream, value.clone()));
        }

        fn on_ignored(&self, stream: Stream, reason: IgnoreReason) {
            self.ignored.lock().push((stream, reason));
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&DataValue::good(3i64)), Delivery::Usable(&Value::Int(3)));
        assert_eq!(
            classify(&DataValue::bad(3i64)),
            Delivery::Ignored(IgnoreReason::BadQuality(Quality::bad()))
        );
        assert_eq!(classify(&DataValue::null()), Delivery::Ignored(IgnoreReason::NullValue));
        // Quality is checked before null-ness
        assert_eq!(
            classify(&DataValue::new(None, Quality::uncertain())),
            Delivery::Ignored(IgnoreReason::BadQuality(Quality::uncertain()))
        );
    }

    #[test]
    fn test_filtered_delivery() {
        let space = AddressSpace::new();
        let node = space
            .add_variable(NodeId::string(2, "In"), "In", DataValue::good(0i64))
            .unwrap();
        let recorder = Arc::new(Recorder::default());
        let handle = subscribe(&node, Stream::Input, recorder.clone()).unwrap();
        assert_eq!(handle.node(), node.id());

        node.write_value_from_source(DataValue::good(1i64)).unwrap();
        node.write_value_from_source(DataValue::bad(2i64)).unwrap();
        node.write_value_from_source(DataValue::null()).unwrap();
        node.write_value_from_source(DataValue::good(3i64)).unwrap();

        assert_eq!(
            *recorder.values.lock(),
            vec![(Stream::Input, Value::Int(1)), (Stream::Input, Value::Int(3))]
        );
        assert_eq!(recorder.ignored.lock().len(), 2);

        handle.dispose();
        node.write_value_from_source(DataValue::good(4i64)).unwrap();
        assert_eq!(recorder.values.lock().len(), 2);
    }
}
