// src/resolver.rs - Resolve configured references to value-bearing nodes
use crate::{
    address_space::{AddressSpace, NodeClass, NodeHandle, NodeRef},
    error::{AlarmError, Result},
    node_id::NodeId,
};
use tracing::debug;

/// Resolve `reference` to a live variable node of `space`.
///
/// Fails with [`AlarmError::Resolution`] when the reference does not map to a
/// live node, is ambiguous, or names a node that carries no value. There is
/// no retry.
pub fn resolve(space: &AddressSpace, reference: &NodeRef) -> Result<NodeHandle> {
    let handle = space
        .coerce_node(reference)
        .ok_or_else(|| AlarmError::resolution(reference, unresolved_reason(space, reference)))?;

    match handle.node_class()? {
        NodeClass::Variable => {
            debug!("Resolved '{}' to {}", reference, handle.id());
            Ok(handle)
        }
        NodeClass::Object => Err(AlarmError::resolution(
            reference,
            "node is not a variable and carries no value",
        )),
    }
}

fn unresolved_reason(space: &AddressSpace, reference: &NodeRef) -> String {
    match reference {
        NodeRef::Text(text) if NodeId::looks_like_node_id(text) => match text.parse::<NodeId>() {
            Ok(_) => "no such node".to_string(),
            Err(e) => e.to_string(),
        },
        NodeRef::Text(text) => match space.find_by_browse_name(text).len() {
            0 => "no node with this browse name".to_string(),
            n => format!("browse name is ambiguous ({} nodes)", n),
        },
        NodeRef::Handle(_) => "node has been removed".to_string(),
        NodeRef::Id(_) => "no such node".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DataValue;

    fn reason_of(result: Result<NodeHandle>) -> String {
        match result {
            Err(AlarmError::Resolution { reason, .. }) => reason,
            other => panic!("expected resolution error, got {:?}", other.map(|h| h.id().clone())),
        }
    }

    #[test]
    fn test_resolves_variables() {
        let space = AddressSpace::new();
        let id = NodeId::string(2, "Level");
        space.add_variable(id.clone(), "Level", DataValue::good(1i64)).unwrap();

        assert_eq!(resolve(&space, &NodeRef::from(id.clone())).unwrap().id(), &id);
        assert_eq!(resolve(&space, &NodeRef::from("Level")).unwrap().id(), &id);
    }

    #[test]
    fn test_failure_reasons() {
        let space = AddressSpace::new();
        space.add_object(NodeId::string(1, "Folder"), "Folder").unwrap();
        space.add_variable(NodeId::string(2, "A"), "Twin", DataValue::null()).unwrap();
        space.add_variable(NodeId::string(2, "B"), "Twin", DataValue::null()).unwrap();

        assert_eq!(reason_of(resolve(&space, &NodeRef::from("ns=9;i=1"))), "no such node");
        assert!(reason_of(resolve(&space, &NodeRef::from("ns=x;i=1"))).contains("Invalid node id"));
        assert_eq!(reason_of(resolve(&space, &NodeRef::from("Nope"))), "no node with this browse name");
        assert!(reason_of(resolve(&space, &NodeRef::from("Twin"))).contains("ambiguous (2 nodes)"));
        assert!(reason_of(resolve(&space, &NodeRef::from("Folder"))).contains("not a variable"));
    }

    #[test]
    fn test_stale_handle() {
        let space = AddressSpace::new();
        let handle = space.add_variable(NodeId::string(2, "Gone"), "Gone", DataValue::null()).unwrap();
        space.remove_subtree(handle.id()).unwrap();
        assert_eq!(reason_of(resolve(&space, &NodeRef::from(handle))), "node has been removed");
    }
}
