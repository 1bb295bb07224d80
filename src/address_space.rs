// src/address_space.rs - In-process address space with value change notification
use crate::{
    error::{AlarmError, Result},
    node_id::NodeId,
    value::DataValue,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

/// Callback invoked with the new [`DataValue`] whenever a node's value changes
pub type ValueChangeHandler = Arc<dyn Fn(&DataValue) + Send + Sync>;

/// Unique identifier for a value change subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Node classes known to the address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    /// Container node without a value (e.g. an alarm object)
    Object,
    /// Value-bearing node
    Variable,
}

#[derive(Debug, Clone)]
struct Node {
    browse_name: String,
    class: NodeClass,
    value: DataValue,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

struct Subscriber {
    id: SubscriptionId,
    handler: ValueChangeHandler,
}

/// Value changes waiting for their handlers, in write order
#[derive(Default)]
struct Dispatch {
    queue: VecDeque<(NodeId, DataValue)>,
    draining: bool,
}

/// Clears the draining flag if a handler panics mid-dispatch
struct DrainReset<'a>(&'a Mutex<Dispatch>);

impl Drop for DrainReset<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock().draining = false;
        }
    }
}

/// Shared, thread-safe address space
///
/// Holds the nodes alarms read from and write to, and dispatches value change
/// notifications to subscribers. Cloning is cheap; all clones see the same
/// nodes.
///
/// Notifications are delivered in the order the values were stored. A write
/// made from inside a handler, or from another thread while a dispatch is
/// running, is queued and delivered by the running dispatch after the
/// current notification completes.
///
/// # Examples
///
/// ```rust
/// use offnormal::{AddressSpace, DataValue, NodeId, Value};
///
/// let space = AddressSpace::new();
/// let id = NodeId::string(2, "Tank.Level");
/// space.add_variable(id.clone(), "Tank.Level", DataValue::good(10i64))?;
///
/// space.write_value_from_source(&id, DataValue::good(12i64))?;
/// assert_eq!(space.read(&id)?.value, Some(Value::Int(12)));
/// # Ok::<(), offnormal::AlarmError>(())
/// ```
#[derive(Clone, Default)]
pub struct AddressSpace {
    nodes: Arc<DashMap<NodeId, Node>>,
    subscribers: Arc<DashMap<NodeId, Vec<Subscriber>>>,
    dispatch: Arc<Mutex<Dispatch>>,
}

impl AddressSpace {
    /// Create an empty address space
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value-bearing node
    pub fn add_variable(
        &self,
        id: NodeId,
        browse_name: impl Into<String>,
        initial: DataValue,
    ) -> Result<NodeHandle> {
        self.insert(id, browse_name.into(), NodeClass::Variable, initial, None)
    }

    /// Add an object node (no value)
    pub fn add_object(&self, id: NodeId, browse_name: impl Into<String>) -> Result<NodeHandle> {
        self.insert(id, browse_name.into(), NodeClass::Object, DataValue::null(), None)
    }

    /// Add a property variable below `parent`. The property id is derived with
    /// [`NodeId::child`].
    pub fn add_property(&self, parent: &NodeId, name: &str, initial: DataValue) -> Result<NodeHandle> {
        if !self.contains(parent) {
            return Err(AlarmError::NodeNotFound(parent.to_string()));
        }
        let id = parent.child(name);
        let handle = self.insert(
            id.clone(),
            name.to_string(),
            NodeClass::Variable,
            initial,
            Some(parent.clone()),
        )?;
        if let Some(mut node) = self.nodes.get_mut(parent) {
            node.children.push(id);
        }
        Ok(handle)
    }

    fn insert(
        &self,
        id: NodeId,
        browse_name: String,
        class: NodeClass,
        value: DataValue,
        parent: Option<NodeId>,
    ) -> Result<NodeHandle> {
        use dashmap::mapref::entry::Entry;

        match self.nodes.entry(id.clone()) {
            Entry::Occupied(_) => Err(AlarmError::DuplicateNode(id.to_string())),
            Entry::Vacant(slot) => {
                trace!("Adding {:?} node {} ({})", class, id, browse_name);
                slot.insert(Node {
                    browse_name,
                    class,
                    value,
                    parent,
                    children: Vec::new(),
                });
                Ok(NodeHandle {
                    id,
                    space: self.clone(),
                })
            }
        }
    }

    /// Check if a node exists
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Look a node up by id
    pub fn find_node(&self, id: &NodeId) -> Option<NodeHandle> {
        self.contains(id).then(|| NodeHandle {
            id: id.clone(),
            space: self.clone(),
        })
    }

    /// All nodes carrying the given browse name
    pub fn find_by_browse_name(&self, browse_name: &str) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|entry| entry.value().browse_name == browse_name)
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Turn a node reference into a live node handle, if possible.
    ///
    /// Textual references are parsed as node ids when they have node id
    /// syntax, and otherwise looked up as a unique browse name.
    pub fn coerce_node(&self, reference: &NodeRef) -> Option<NodeHandle> {
        match reference {
            NodeRef::Id(id) => self.find_node(id),
            NodeRef::Handle(handle) => self.find_node(&handle.id),
            NodeRef::Text(text) => {
                if NodeId::looks_like_node_id(text) {
                    let id = text.parse::<NodeId>().ok()?;
                    return self.find_node(&id);
                }
                match self.find_by_browse_name(text).as_slice() {
                    [only] => self.find_node(only),
                    _ => None,
                }
            }
        }
    }

    /// Node class of an existing node
    pub fn node_class(&self, id: &NodeId) -> Result<NodeClass> {
        self.nodes
            .get(id)
            .map(|node| node.class)
            .ok_or_else(|| AlarmError::NodeNotFound(id.to_string()))
    }

    /// Browse name of an existing node
    pub fn browse_name(&self, id: &NodeId) -> Result<String> {
        self.nodes
            .get(id)
            .map(|node| node.browse_name.clone())
            .ok_or_else(|| AlarmError::NodeNotFound(id.to_string()))
    }

    /// Child node ids of an existing node
    pub fn children(&self, id: &NodeId) -> Result<Vec<NodeId>> {
        self.nodes
            .get(id)
            .map(|node| node.children.clone())
            .ok_or_else(|| AlarmError::NodeNotFound(id.to_string()))
    }

    /// Parent of an existing node, if it is a property
    pub fn parent(&self, id: &NodeId) -> Result<Option<NodeId>> {
        self.nodes
            .get(id)
            .map(|node| node.parent.clone())
            .ok_or_else(|| AlarmError::NodeNotFound(id.to_string()))
    }

    /// Read the current value of a node
    pub fn read(&self, id: &NodeId) -> Result<DataValue> {
        self.nodes
            .get(id)
            .map(|node| node.value.clone())
            .ok_or_else(|| AlarmError::NodeNotFound(id.to_string()))
    }

    /// Store a new value on a variable node and notify subscribers if it
    /// differs from the stored one. Returns whether a change was dispatched.
    pub fn write_value_from_source(&self, id: &NodeId, value: DataValue) -> Result<bool> {
        let changed = {
            let mut node = self
                .nodes
                .get_mut(id)
                .ok_or_else(|| AlarmError::NodeNotFound(id.to_string()))?;
            if node.class != NodeClass::Variable {
                return Err(AlarmError::NotAVariable(id.to_string()));
            }
            let changed = node.value.differs_from(&value);
            node.value = value.clone();
            if changed {
                // Enqueued under the node guard so queue order matches store order
                self.dispatch.lock().queue.push_back((id.clone(), value.clone()));
            }
            changed
        };

        trace!("Write {} = {:?} (changed: {})", id, value.value, changed);
        if changed {
            self.drain();
        }
        Ok(changed)
    }

    /// Deliver queued changes until the queue is empty. Returns at once if
    /// another call is already delivering.
    fn drain(&self) {
        {
            let mut dispatch = self.dispatch.lock();
            if dispatch.draining {
                return;
            }
            dispatch.draining = true;
        }
        let _reset = DrainReset(&self.dispatch);

        loop {
            let (id, value) = {
                let mut dispatch = self.dispatch.lock();
                match dispatch.queue.pop_front() {
                    Some(next) => next,
                    None => {
                        dispatch.draining = false;
                        return;
                    }
                }
            };
            self.notify(&id, &value);
        }
    }

    fn notify(&self, id: &NodeId, value: &DataValue) {
        // Handlers run without any map guard held so they may use the space.
        let handlers: Vec<ValueChangeHandler> = match self.subscribers.get(id) {
            Some(list) => list.iter().map(|s| s.handler.clone()).collect(),
            None => return,
        };
        for handler in handlers {
            handler(value);
        }
    }

    /// Register a value change handler on a node
    pub fn subscribe(&self, id: &NodeId, handler: ValueChangeHandler) -> Result<SubscriptionHandle> {
        if !self.contains(id) {
            return Err(AlarmError::NodeNotFound(id.to_string()));
        }
        let sub_id = SubscriptionId::new();
        self.subscribers
            .entry(id.clone())
            .or_default()
            .push(Subscriber { id: sub_id, handler });
        trace!("Subscribed {:?} to {}", sub_id, id);
        Ok(SubscriptionHandle {
            id: sub_id,
            node: id.clone(),
            space: self.clone(),
            active: true,
        })
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: &NodeId, subscription: SubscriptionId) -> bool {
        let removed = match self.subscribers.get_mut(id) {
            Some(mut list) => {
                let before = list.len();
                list.retain(|s| s.id != subscription);
                before != list.len()
            }
            None => false,
        };
        self.subscribers.remove_if(id, |_, list| list.is_empty());
        if removed {
            trace!("Unsubscribed {:?} from {}", subscription, id);
        }
        removed
    }

    /// Number of live subscriptions on a node
    pub fn subscriber_count(&self, id: &NodeId) -> usize {
        self.subscribers.get(id).map(|list| list.len()).unwrap_or(0)
    }

    /// Remove a node, all of its properties and their subscriptions
    pub fn remove_subtree(&self, id: &NodeId) -> Result<()> {
        let (_, node) = self
            .nodes
            .remove(id)
            .ok_or_else(|| AlarmError::NodeNotFound(id.to_string()))?;
        self.subscribers.remove(id);

        if let Some(parent) = &node.parent {
            if let Some(mut p) = self.nodes.get_mut(parent) {
                p.children.retain(|child| child != id);
            }
        }
        for child in &node.children {
            // Children may already be gone if removed individually
            let _ = self.remove_subtree(child);
        }
        Ok(())
    }

    /// Get the number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the address space is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressSpace")
            .field("nodes", &self.nodes.len())
            .field("subscribed_nodes", &self.subscribers.len())
            .field("pending", &self.dispatch.lock().queue.len())
            .finish()
    }
}

/// Handle to a node of an [`AddressSpace`]
#[derive(Clone, Debug)]
pub struct NodeHandle {
    id: NodeId,
    space: AddressSpace,
}

impl NodeHandle {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Whether the node still exists in its address space
    pub fn is_live(&self) -> bool {
        self.space.contains(&self.id)
    }

    pub fn node_class(&self) -> Result<NodeClass> {
        self.space.node_class(&self.id)
    }

    pub fn browse_name(&self) -> Result<String> {
        self.space.browse_name(&self.id)
    }

    pub fn read_current_value(&self) -> Result<DataValue> {
        self.space.read(&self.id)
    }

    pub fn write_value_from_source(&self, value: DataValue) -> Result<bool> {
        self.space.write_value_from_source(&self.id, value)
    }

    pub fn subscribe_to_value_change<F>(&self, handler: F) -> Result<SubscriptionHandle>
    where
        F: Fn(&DataValue) + Send + Sync + 'static,
    {
        self.space.subscribe(&self.id, Arc::new(handler))
    }
}

/// Reference to a node as supplied by configuration or callers
#[derive(Clone, Debug)]
pub enum NodeRef {
    /// Parsed node id
    Id(NodeId),
    /// Node id text or browse name
    Text(String),
    /// Previously obtained handle
    Handle(NodeHandle),
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Id(id) => write!(f, "{}", id),
            NodeRef::Text(text) => write!(f, "{}", text),
            NodeRef::Handle(handle) => write!(f, "{}", handle.id),
        }
    }
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        NodeRef::Id(id)
    }
}

impl From<&str> for NodeRef {
    fn from(text: &str) -> Self {
        NodeRef::Text(text.to_string())
    }
}

impl From<String> for NodeRef {
    fn from(text: String) -> Self {
        NodeRef::Text(text)
    }
}

impl From<NodeHandle> for NodeRef {
    fn from(handle: NodeHandle) -> Self {
        NodeRef::Handle(handle)
    }
}

/// Disposable registration returned by [`AddressSpace::subscribe`].
///
/// The subscription is removed when the handle is dropped or
/// [`unsubscribe`](Self::unsubscribe) is called.
#[must_use = "dropping the handle removes the subscription"]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    node: NodeId,
    space: AddressSpace,
    active: bool,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.active {
            self.active = false;
            self.space.unsubscribe(&self.node, self.id);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("active", &self.active)
            .finish()
    }
}
