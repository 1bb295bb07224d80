// src/node_id.rs - OPC-style node identifiers
use crate::error::AlarmError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier part of a [`NodeId`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    /// `i=<u32>`
    Numeric(u32),
    /// `s=<string>`
    String(String),
}

/// Node identifier in the address space
///
/// The textual form follows the usual OPC convention:
///
/// ```rust
/// use offnormal::NodeId;
///
/// let id: NodeId = "ns=2;s=Pump1.Running".parse()?;
/// assert_eq!(id.namespace, 2);
/// assert_eq!(id.to_string(), "ns=2;s=Pump1.Running");
///
/// // Namespace 0 may be omitted
/// let server: NodeId = "i=2253".parse()?;
/// assert_eq!(server, NodeId::numeric(0, 2253));
/// # Ok::<(), offnormal::AlarmError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: Identifier,
}

impl NodeId {
    pub fn numeric(namespace: u16, value: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(value.into()),
        }
    }

    /// Child id used for properties hanging off this node, e.g.
    /// `ns=1;s=Alarm` + `ActiveState` -> `ns=1;s=Alarm.ActiveState`.
    pub fn child(&self, name: &str) -> NodeId {
        let base = match &self.identifier {
            Identifier::Numeric(n) => n.to_string(),
            Identifier::String(s) => s.clone(),
        };
        NodeId::string(self.namespace, format!("{}.{}", base, name))
    }

    /// Quick syntactic check used when a textual reference could be either a
    /// node id or a browse name.
    pub fn looks_like_node_id(text: &str) -> bool {
        let text = text.trim();
        text.starts_with("ns=") || text.starts_with("i=") || text.starts_with("s=")
    }
}

impl FromStr for NodeId {
    type Err = AlarmError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || AlarmError::InvalidNodeId(text.to_string());
        let trimmed = text.trim();

        let (namespace, rest) = match trimmed.strip_prefix("ns=") {
            Some(tail) => {
                let (ns, rest) = tail.split_once(';').ok_or_else(invalid)?;
                (ns.parse::<u16>().map_err(|_| invalid())?, rest)
            }
            None => (0, trimmed),
        };

        if let Some(n) = rest.strip_prefix("i=") {
            let value = n.parse::<u32>().map_err(|_| invalid())?;
            Ok(NodeId::numeric(namespace, value))
        } else if let Some(s) = rest.strip_prefix("s=") {
            if s.is_empty() {
                return Err(invalid());
            }
            Ok(NodeId::string(namespace, s))
        } else {
            Err(invalid())
        }
    }
}

impl TryFrom<String> for NodeId {
    type Error = AlarmError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            Identifier::Numeric(n) => write!(f, "ns={};i={}", self.namespace, n),
            Identifier::String(s) => write!(f, "ns={};s={}", self.namespace, s),
        }
    }
}
