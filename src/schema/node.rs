//! Schema node definitions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::schema::types::ValueSpec;

/// Named children in declaration order.
pub type Children = IndexMap<String, SchemaNode>;

/// Shape of a schema node.
///
/// A tag node matches any segment accepted by `key` as an entry name; the
/// entry's children are described by `entry`. Leaf and multi nodes take
/// their value as the following path segment.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Leaf(ValueSpec),
    Multi(ValueSpec),
    Container(Children),
    Tag { key: ValueSpec, entry: Children },
}

/// Node type reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Leaf,
    Multi,
    Container,
    Tag,
}

/// One location of the static schema tree.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub name: String,
    pub help: String,

    /// Commit ordering for the action declared here (lower runs first).
    pub priority: Option<u32>,

    /// External command run when anything at or below this node changes.
    pub action: Option<String>,

    /// Containers with presence survive having all children deleted.
    pub presence: bool,

    pub kind: NodeKind,
}

impl SchemaNode {
    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::Leaf(_) => NodeType::Leaf,
            NodeKind::Multi(_) => NodeType::Multi,
            NodeKind::Container(_) => NodeType::Container,
            NodeKind::Tag { .. } => NodeType::Tag,
        }
    }

    /// Value constraints of a leaf or multi, or the key constraints of a tag.
    pub fn value_spec(&self) -> Option<&ValueSpec> {
        match &self.kind {
            NodeKind::Leaf(spec) | NodeKind::Multi(spec) => Some(spec),
            NodeKind::Tag { key, .. } => Some(key),
            NodeKind::Container(_) => None,
        }
    }

    /// True when a path must continue past this node with a value or key.
    pub fn requires_value(&self) -> bool {
        match &self.kind {
            NodeKind::Leaf(spec) | NodeKind::Multi(spec) => spec.takes_value(),
            NodeKind::Tag { .. } => true,
            NodeKind::Container(_) => false,
        }
    }

    pub fn default_value(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Leaf(spec) => spec.default.as_deref(),
            _ => None,
        }
    }

    pub fn is_tag(&self) -> bool {
        matches!(self.kind, NodeKind::Tag { .. })
    }
}
