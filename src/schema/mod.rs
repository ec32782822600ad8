//! Schema Store: the static template tree.
//!
//! # Data Flow
//! ```text
//! schema definition (TOML)
//!     → loader.rs (deserialize, compile types and patterns)
//!     → Schema (immutable, shared via Arc)
//!     → lookups from the tree, diff, commit, and persistence code
//! ```
//!
//! # Design Decisions
//! - Path resolution is a fold over [`NodeKind`]: a tag consumes one
//!   segment as its entry key, a leaf or multi consumes one as its value
//! - Structural lookups ignore value constraints; validation applies them
//! - The schema never changes after startup, so reads need no locking

pub mod loader;
pub mod node;
pub mod types;

use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Cause, PathDiagnostic};

pub use loader::SchemaError;
pub use node::{Children, NodeKind, NodeType, SchemaNode};
pub use types::{ValuePattern, ValueSpec, ValueType};

/// Entry name shown by help listings for free-form values.
pub const PATTERN_HELP_KEY: &str = "<pattern>";

/// What the last segment of a resolved path denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// The schema node itself.
    Node,
    /// An entry key of a tag node.
    Entry,
    /// A value of a leaf or multi node.
    Value,
}

/// A schema node reached by a path, and how the path ended on it.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    pub node: &'a SchemaNode,
    pub position: Position,
}

impl<'a> Resolved<'a> {
    /// Children schema for data nodes stored directly below this path.
    pub fn named_children(&self) -> Option<&'a Children> {
        let node: &'a SchemaNode = self.node;
        match (&node.kind, self.position) {
            (NodeKind::Container(children), Position::Node) => Some(children),
            (NodeKind::Tag { entry, .. }, Position::Entry) => Some(entry),
            _ => None,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self.position {
            Position::Entry => NodeType::Container,
            _ => self.node.node_type(),
        }
    }

    /// True when the path stops where a value or entry key is still needed.
    pub fn is_incomplete(&self) -> bool {
        self.position == Position::Node && self.node.requires_value()
    }
}

/// Where and why a path left the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFault {
    pub index: usize,
    pub cause: Cause,
}

impl PathFault {
    pub fn diagnostic(self, path: &[String]) -> PathDiagnostic {
        PathDiagnostic::at(path, self.index, self.cause)
    }
}

/// Innermost node declaring a commit action for a path.
#[derive(Debug, Clone, Copy)]
pub struct ActionScope<'a> {
    /// Number of path segments naming the scope.
    pub depth: usize,
    pub node: &'a SchemaNode,
    pub action: &'a str,
}

/// The immutable schema tree.
#[derive(Debug, Clone)]
pub struct Schema {
    root: SchemaNode,
}

impl Schema {
    pub fn new(children: Children) -> Self {
        Self {
            root: SchemaNode {
                name: String::new(),
                help: String::new(),
                priority: None,
                action: None,
                presence: true,
                kind: NodeKind::Container(children),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        Ok(Self::new(loader::load_schema_file(path)?))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, SchemaError> {
        Ok(Self::new(loader::parse_schema(content)?))
    }

    pub fn root(&self) -> Resolved<'_> {
        Resolved {
            node: &self.root,
            position: Position::Node,
        }
    }

    pub fn top_level(&self) -> &Children {
        match &self.root.kind {
            NodeKind::Container(children) => children,
            _ => unreachable!("schema root is always a container"),
        }
    }

    /// Resolve every prefix of `path`, one step per segment.
    fn walk<'a>(&'a self, path: &[String], check_values: bool) -> Result<Vec<Resolved<'a>>, PathFault> {
        let mut steps = Vec::with_capacity(path.len());
        let mut current = self.root();

        for (index, segment) in path.iter().enumerate() {
            let fault = |cause| PathFault { index, cause };
            let next = match (&current.node.kind, current.position) {
                (NodeKind::Container(children), Position::Node)
                | (NodeKind::Tag { entry: children, .. }, Position::Entry) => {
                    let node = children.get(segment).ok_or_else(|| fault(Cause::PathInvalid))?;
                    Resolved {
                        node,
                        position: Position::Node,
                    }
                }
                (NodeKind::Tag { key, .. }, Position::Node) => {
                    if check_values && !key.accepts(segment) {
                        return Err(fault(Cause::ValueInvalid {
                            choices: key.choices(),
                        }));
                    }
                    Resolved {
                        node: current.node,
                        position: Position::Entry,
                    }
                }
                (NodeKind::Leaf(spec) | NodeKind::Multi(spec), Position::Node) => {
                    if !spec.takes_value() {
                        return Err(fault(Cause::PathInvalid));
                    }
                    if check_values && !spec.accepts(segment) {
                        return Err(fault(Cause::ValueInvalid {
                            choices: spec.choices(),
                        }));
                    }
                    Resolved {
                        node: current.node,
                        position: Position::Value,
                    }
                }
                _ => return Err(fault(Cause::PathInvalid)),
            };
            steps.push(next);
            current = next;
        }
        Ok(steps)
    }

    /// Structural resolution; values are not checked.
    pub fn lookup(&self, path: &[String]) -> Result<Resolved<'_>, PathFault> {
        let steps = self.walk(path, false)?;
        Ok(steps.last().copied().unwrap_or_else(|| self.root()))
    }

    /// Structural resolution plus type and allowed-value checks.
    pub fn validate(&self, path: &[String]) -> Result<Resolved<'_>, PathFault> {
        let steps = self.walk(path, true)?;
        Ok(steps.last().copied().unwrap_or_else(|| self.root()))
    }

    /// Like [`Schema::validate`], and the path must not stop short of a value.
    pub fn validate_complete(&self, path: &[String]) -> Result<Resolved<'_>, PathFault> {
        let resolved = self.validate(path)?;
        if path.is_empty() {
            return Err(PathFault {
                index: 0,
                cause: Cause::PathInvalid,
            });
        }
        if resolved.is_incomplete() {
            return Err(PathFault {
                index: path.len() - 1,
                cause: Cause::ValueRequired,
            });
        }
        Ok(resolved)
    }

    pub fn get(&self, path: &[String]) -> Option<&SchemaNode> {
        self.lookup(path).ok().map(|r| r.node)
    }

    /// Immediate schema child names in declaration order.
    pub fn children(&self, path: &[String]) -> Vec<String> {
        self.lookup(path)
            .ok()
            .and_then(|r| r.named_children())
            .map(|children| children.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Allowed literals, then pattern names, for the value at `path`.
    pub fn allowed_values(&self, path: &[String]) -> Vec<String> {
        match self.lookup(path) {
            Ok(r) if r.position == Position::Node => {
                r.node.value_spec().map(ValueSpec::choices).unwrap_or_default()
            }
            _ => Vec::new(),
        }
    }

    pub fn validate_path(&self, path: &[String]) -> bool {
        self.lookup(path).is_ok()
    }

    pub fn validate_values(&self, path: &[String]) -> bool {
        self.validate(path).is_ok()
    }

    pub fn node_type(&self, path: &[String]) -> Option<NodeType> {
        if path.is_empty() {
            return None;
        }
        self.lookup(path).ok().map(|r| r.node_type())
    }

    /// Template attributes of the node at `path`.
    ///
    /// Keys: `help`, `type`, `tag`/`key` for tag nodes, `multi`,
    /// `is_value`, `default`, `priority`, `allowed`.
    pub fn template(&self, path: &[String]) -> Option<BTreeMap<String, String>> {
        if path.is_empty() {
            return None;
        }
        let resolved = self.lookup(path).ok()?;
        let node = resolved.node;
        let mut attrs = BTreeMap::new();
        attrs.insert("help".to_string(), node.help.clone());

        if let Some(spec) = node.value_spec() {
            if let Some(ty) = spec.ty {
                attrs.insert("type".to_string(), ty.name().to_string());
            }
            if !spec.allowed.is_empty() {
                attrs.insert("allowed".to_string(), spec.allowed.join(" "));
            }
            if let Some(default) = &spec.default {
                attrs.insert("default".to_string(), default.clone());
            }
        }
        match node.kind {
            NodeKind::Tag { .. } => {
                attrs.insert("tag".to_string(), "1".to_string());
                attrs.insert("key".to_string(), "tagnode".to_string());
            }
            NodeKind::Multi(_) => {
                attrs.insert("multi".to_string(), "1".to_string());
            }
            _ => {}
        }
        if resolved.position != Position::Node {
            attrs.insert("is_value".to_string(), "1".to_string());
        }
        if let Some(priority) = node.priority {
            attrs.insert("priority".to_string(), priority.to_string());
        }
        Some(attrs)
    }

    /// Innermost action-declaring node on `path`.
    ///
    /// An action on a tag node is scoped to one entry, so the scope then
    /// includes the entry key.
    pub fn action_scope(&self, path: &[String]) -> Option<ActionScope<'_>> {
        let steps = match self.walk(path, false) {
            Ok(steps) => steps,
            Err(fault) => self.walk(&path[..fault.index], false).ok()?,
        };
        let mut scope = None;
        for (index, step) in steps.iter().enumerate() {
            let Some(action) = step.node.action.as_deref() else {
                continue;
            };
            let applies = match step.position {
                Position::Node => !step.node.is_tag(),
                Position::Entry => true,
                Position::Value => false,
            };
            if applies {
                scope = Some(ActionScope {
                    depth: index + 1,
                    node: step.node,
                    action,
                });
            }
        }
        scope
    }

    /// Help text keyed by child name.
    ///
    /// Tag, leaf, and multi nodes list the given `existing` entries or values
    /// plus their allowed literals. With `with_pattern`, free-form value
    /// nodes also list [`PATTERN_HELP_KEY`].
    pub fn help(
        &self,
        path: &[String],
        existing: &[String],
        with_pattern: bool,
    ) -> IndexMap<String, String> {
        let mut help = IndexMap::new();
        let Ok(resolved) = self.lookup(path) else {
            return help;
        };

        if let Some(children) = resolved.named_children() {
            for (name, child) in children {
                help.insert(name.clone(), child.help.clone());
            }
            return help;
        }

        if resolved.position != Position::Node {
            return help;
        }
        let node = resolved.node;
        if let Some(spec) = node.value_spec() {
            if with_pattern && spec.is_free_form() {
                help.insert(PATTERN_HELP_KEY.to_string(), node.help.clone());
            }
            for name in spec.allowed.iter().chain(existing) {
                help.insert(name.clone(), node.help.clone());
            }
        }
        help
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{p, sample_schema};

    #[test]
    fn test_children_of_container() {
        let schema = sample_schema();
        let mut children = schema.children(&p(&["system"]));
        children.sort();
        assert_eq!(
            children,
            p(&[
                "acm",
                "alg",
                "config-management",
                "config-sync",
                "console",
                "domain-name",
                "domain-search",
                "fips",
                "host-name",
                "ip",
                "ipv6",
                "login",
                "name-server",
                "ntp",
                "options",
                "package",
                "power-profile",
                "session",
                "static-host-mapping",
                "syslog",
                "tacplus-options",
                "time-zone",
            ])
        );
    }

    #[test]
    fn test_validate_values_against_allowed_set() {
        let schema = sample_schema();
        let base = ["system", "console", "device", "ttyS0", "speed"];
        let mut bad = p(&base);
        bad.push("1".into());
        let mut good = p(&base);
        good.push("115200".into());

        assert!(schema.validate_path(&bad));
        assert!(!schema.validate_values(&bad));
        assert!(schema.validate_values(&good));
        assert!(!schema.validate_path(&p(&["foo", "bar", "baz"])));
    }

    #[test]
    fn test_allowed_values() {
        let schema = sample_schema();
        let mut allowed = schema.allowed_values(&p(&["system", "console", "device", "ttyS0", "speed"]));
        allowed.sort();
        assert_eq!(
            allowed,
            p(&["115200", "1200", "19200", "2400", "38400", "4800", "57600", "9600"])
        );
    }

    #[test]
    fn test_node_types() {
        let schema = sample_schema();
        assert_eq!(schema.node_type(&p(&["system", "name-server"])), Some(NodeType::Multi));
        assert_eq!(schema.node_type(&p(&["system", "console"])), Some(NodeType::Container));
        assert_eq!(schema.node_type(&p(&["system", "console", "device"])), Some(NodeType::Tag));
        assert_eq!(
            schema.node_type(&p(&["system", "console", "device", "ttyS0"])),
            Some(NodeType::Container)
        );
        assert_eq!(
            schema.node_type(&p(&["system", "console", "device", "ttyS0", "speed"])),
            Some(NodeType::Leaf)
        );
        assert_eq!(schema.node_type(&p(&["nope"])), None);
    }

    #[test]
    fn test_template_of_tag_node() {
        let schema = sample_schema();
        let attrs = schema.template(&p(&["system", "ntp", "server"])).unwrap();
        assert_eq!(attrs["help"], "Network Time Protocol (NTP) server");
        assert_eq!(attrs["key"], "tagnode");
        assert_eq!(attrs["tag"], "1");
        assert_eq!(attrs["type"], "txt");
        assert!(!attrs.contains_key("is_value"));

        let entry = schema.template(&p(&["system", "ntp", "server", "pool.ntp.org"])).unwrap();
        assert_eq!(entry["is_value"], "1");
    }

    #[test]
    fn test_fault_positions() {
        let schema = sample_schema();
        let path = p(&["system", "ntp", "3.ca.pool.ntp.org"]);
        let fault = schema.validate(&path).unwrap_err();
        assert_eq!(fault.index, 2);
        assert_eq!(fault.cause, Cause::PathInvalid);

        let path = p(&["interfaces", "dataplane", "3"]);
        let fault = schema.validate(&path).unwrap_err();
        assert_eq!(fault.index, 2);
        assert!(matches!(fault.cause, Cause::ValueInvalid { ref choices } if choices.len() == 3));

        let fault = schema.validate_complete(&p(&["system", "ntp", "server"])).unwrap_err();
        assert_eq!(fault.cause, Cause::ValueRequired);
    }

    #[test]
    fn test_action_scope() {
        let schema = sample_schema();
        let scope = schema
            .action_scope(&p(&["system", "ntp", "server", "a.pool", "prefer"]))
            .unwrap();
        assert_eq!(scope.depth, 2);
        assert!(scope.action.contains("ntp"));

        let scope = schema
            .action_scope(&p(&["interfaces", "dataplane", "dp0s3", "mtu", "1500"]))
            .unwrap();
        assert_eq!(scope.depth, 3);

        assert!(schema.action_scope(&p(&["system", "host-name", "r1"])).is_none());
    }

    #[test]
    fn test_help_with_pattern() {
        let schema = sample_schema();
        let path = p(&["system", "console", "device"]);
        let help = schema.help(&path, &p(&["ttyS0"]), false);
        assert_eq!(help.len(), 1);
        assert_eq!(help["ttyS0"], "Serial console device name");

        let help = schema.help(&path, &p(&["ttyS0"]), true);
        assert_eq!(help.len(), 2);
        assert_eq!(help[PATTERN_HELP_KEY], "Serial console device name");
    }
}
