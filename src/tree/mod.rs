//! Configuration Tree: concrete data bound to schema paths.
//!
//! # Responsibilities
//! - Store running and candidate data as a generic segment tree
//! - Apply schema-aware set and delete edits
//! - Prune ancestors left empty by a delete
//! - Order children the way the schema declares them
//!
//! # Design Decisions
//! - Leaf values, multi values, and tag entry keys are child segments, so
//!   every stored location is addressable by the same path a client sends
//! - The tree is schema-free; callers pass the [`Schema`] to edits that
//!   need it, which keeps clones cheap to reason about
//! - Equality ignores child order (multi values form a set)
//! - A node may carry a comment; comments are not change records and
//!   travel through [`comment_changes`] instead

pub mod diff;
pub mod view;

use indexmap::IndexMap;

use crate::schema::{NodeKind, Position, Schema};

pub use diff::{diff, replay, ChangeOp, ChangeRecord};
pub use view::NodeStatus;

/// One node of a configuration tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigNode {
    children: IndexMap<String, ConfigNode>,
    comment: Option<String>,
}

impl ConfigNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn child(&self, name: &str) -> Option<&ConfigNode> {
        self.children.get(name)
    }

    /// Child names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    pub fn get(&self, path: &[String]) -> Option<&ConfigNode> {
        path.iter().try_fold(self, |node, seg| node.children.get(seg))
    }

    pub fn get_mut(&mut self, path: &[String]) -> Option<&mut ConfigNode> {
        path.iter()
            .try_fold(self, |node, seg| node.children.get_mut(seg))
    }

    pub fn contains(&self, path: &[String]) -> bool {
        self.get(path).is_some()
    }

    /// Node at `path`, creating missing nodes along the way.
    pub fn ensure(&mut self, path: &[String]) -> &mut ConfigNode {
        path.iter().fold(self, |node, seg| {
            node.children.entry(seg.clone()).or_default()
        })
    }

    /// Detach the subtree at `path`. The root itself cannot be removed.
    pub fn remove(&mut self, path: &[String]) -> Option<ConfigNode> {
        let (last, parent) = path.split_last()?;
        self.get_mut(parent)?.children.shift_remove(last)
    }

    /// Place `node` at `path`, replacing whatever was there.
    pub fn insert(&mut self, path: &[String], node: ConfigNode) {
        match path.split_last() {
            Some((last, parent)) => {
                self.ensure(parent).children.insert(last.clone(), node);
            }
            None => *self = node,
        }
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn set_comment(&mut self, comment: Option<String>) {
        self.comment = comment;
    }

    fn clear(&mut self) {
        self.children.clear();
    }
}

/// A comment that differs between two trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentChange {
    pub path: Vec<String>,
    pub comment: Option<String>,
}

/// Comments of nodes in `new` that differ from the same node in `old`.
pub fn comment_changes(old: &ConfigNode, new: &ConfigNode) -> Vec<CommentChange> {
    fn walk(old: Option<&ConfigNode>, new: &ConfigNode, path: &mut Vec<String>, out: &mut Vec<CommentChange>) {
        if old.and_then(ConfigNode::comment) != new.comment() {
            out.push(CommentChange {
                path: path.clone(),
                comment: new.comment.clone(),
            });
        }
        for (name, child) in &new.children {
            path.push(name.clone());
            walk(old.and_then(|o| o.child(name)), child, path, out);
            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(Some(old), new, &mut Vec::new(), &mut out);
    out
}

/// Apply comment changes to the nodes of `onto` that exist.
pub fn apply_comments(onto: &mut ConfigNode, changes: &[CommentChange]) {
    for change in changes {
        if let Some(node) = onto.get_mut(&change.path) {
            node.comment = change.comment.clone();
        }
    }
}

/// Move comments parsed onto leaf values up to the leaf itself.
pub fn settle_comments(schema: &Schema, tree: &mut ConfigNode) {
    fn walk(schema: &Schema, node: &mut ConfigNode, path: &mut Vec<String>) {
        let leaf = schema
            .lookup(path)
            .is_ok_and(|r| r.position == Position::Node && matches!(r.node.kind, NodeKind::Leaf(_)));
        if leaf && node.comment.is_none() {
            node.comment = node.children.values_mut().find_map(|value| value.comment.take());
        }
        for (name, child) in node.children.iter_mut() {
            path.push(name.clone());
            walk(schema, child, path);
            path.pop();
        }
    }

    walk(schema, tree, &mut Vec::new());
}

/// Apply a validated `set` of `path`.
///
/// A leaf holds one value, so setting a value replaces the previous one.
/// Everything else is created if missing.
pub fn apply_set(schema: &Schema, tree: &mut ConfigNode, path: &[String]) {
    if let Ok(resolved) = schema.lookup(path) {
        if resolved.position == Position::Value && matches!(resolved.node.kind, NodeKind::Leaf(_)) {
            if let Some((value, leaf)) = path.split_last() {
                let node = tree.ensure(leaf);
                node.clear();
                node.ensure(std::slice::from_ref(value));
                return;
            }
        }
    }
    tree.ensure(path);
}

/// Apply a `delete` of `path`, pruning ancestors that no longer carry data.
///
/// Returns false when nothing was stored at `path`.
pub fn apply_delete(schema: &Schema, tree: &mut ConfigNode, path: &[String]) -> bool {
    if tree.remove(path).is_none() {
        return false;
    }
    for len in (1..path.len()).rev() {
        let prefix = &path[..len];
        let empty = tree.get(prefix).is_some_and(ConfigNode::is_empty);
        if !empty || !is_prunable(schema, prefix) {
            break;
        }
        tree.remove(prefix);
    }
    true
}

/// True when an empty node at `path` carries no meaning of its own.
fn is_prunable(schema: &Schema, path: &[String]) -> bool {
    let Ok(resolved) = schema.lookup(path) else {
        return true;
    };
    if resolved.position != Position::Node {
        return false;
    }
    match &resolved.node.kind {
        NodeKind::Container(_) => !resolved.node.presence,
        NodeKind::Tag { .. } => true,
        NodeKind::Leaf(spec) | NodeKind::Multi(spec) => spec.takes_value(),
    }
}

/// Order `names` found under `path`.
///
/// Schema-declared children come first in declaration order, followed by
/// unknown names sorted. Tag entries are sorted; multi values keep their
/// given order.
pub fn order_names<'n>(schema: &Schema, path: &[String], mut names: Vec<&'n str>) -> Vec<&'n str> {
    let Ok(resolved) = schema.lookup(path) else {
        names.sort_unstable();
        return names;
    };
    if let Some(declared) = resolved.named_children() {
        names.sort_by_key(|name| (declared.get_index_of(*name).unwrap_or(usize::MAX), *name));
        return names;
    }
    match (&resolved.node.kind, resolved.position) {
        (NodeKind::Multi(_) | NodeKind::Leaf(_), Position::Node) => names,
        _ => {
            names.sort_unstable();
            names
        }
    }
}

/// Children of `node` (stored at `path`) in schema order.
pub fn ordered_children<'a>(schema: &Schema, path: &[String], node: &'a ConfigNode) -> Vec<&'a str> {
    order_names(schema, path, node.names().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{p, sample_schema};

    fn set(schema: &Schema, tree: &mut ConfigNode, segs: &[&str]) {
        apply_set(schema, tree, &p(segs));
    }

    #[test]
    fn test_leaf_value_replaced() {
        let schema = sample_schema();
        let mut tree = ConfigNode::new();
        set(&schema, &mut tree, &["system", "host-name", "r1"]);
        set(&schema, &mut tree, &["system", "host-name", "r2"]);

        let leaf = tree.get(&p(&["system", "host-name"])).unwrap();
        assert_eq!(leaf.names().collect::<Vec<_>>(), vec!["r2"]);
    }

    #[test]
    fn test_multi_values_accumulate() {
        let schema = sample_schema();
        let mut tree = ConfigNode::new();
        set(&schema, &mut tree, &["system", "name-server", "10.0.0.2"]);
        set(&schema, &mut tree, &["system", "name-server", "10.0.0.1"]);

        let ordered = ordered_children(
            &schema,
            &p(&["system", "name-server"]),
            tree.get(&p(&["system", "name-server"])).unwrap(),
        );
        assert_eq!(ordered, vec!["10.0.0.2", "10.0.0.1"]);
    }

    #[test]
    fn test_delete_prunes_empty_ancestors() {
        let schema = sample_schema();
        let mut tree = ConfigNode::new();
        set(&schema, &mut tree, &["system", "ntp", "server", "a.pool"]);

        assert!(apply_delete(&schema, &mut tree, &p(&["system", "ntp", "server", "a.pool"])));
        assert!(tree.is_empty());
        assert!(!apply_delete(&schema, &mut tree, &p(&["system", "ntp"])));
    }

    #[test]
    fn test_delete_keeps_presence_container() {
        let schema = sample_schema();
        let mut tree = ConfigNode::new();
        set(&schema, &mut tree, &["service", "ssh", "port", "22"]);

        apply_delete(&schema, &mut tree, &p(&["service", "ssh", "port", "22"]));
        assert!(tree.contains(&p(&["service", "ssh"])));
        assert!(!tree.contains(&p(&["service", "ssh", "port"])));
    }

    #[test]
    fn test_delete_keeps_siblings() {
        let schema = sample_schema();
        let mut tree = ConfigNode::new();
        set(&schema, &mut tree, &["system", "ntp", "server", "a.pool"]);
        set(&schema, &mut tree, &["system", "ntp", "server", "b.pool"]);

        apply_delete(&schema, &mut tree, &p(&["system", "ntp", "server", "a.pool"]));
        assert!(tree.contains(&p(&["system", "ntp", "server", "b.pool"])));
    }

    #[test]
    fn test_schema_order() {
        let schema = sample_schema();
        let mut tree = ConfigNode::new();
        set(&schema, &mut tree, &["system", "time-zone", "UTC"]);
        set(&schema, &mut tree, &["system", "host-name", "r1"]);
        set(&schema, &mut tree, &["system", "acm", "enable"]);

        let system = tree.get(&p(&["system"])).unwrap();
        assert_eq!(
            ordered_children(&schema, &p(&["system"]), system),
            vec!["acm", "host-name", "time-zone"]
        );
    }

    #[test]
    fn test_comment_changes_follow_rebase() {
        let schema = sample_schema();
        let mut base = ConfigNode::new();
        set(&schema, &mut base, &["system", "host-name", "r1"]);
        let mut edited = base.clone();
        edited
            .get_mut(&p(&["system", "host-name"]))
            .unwrap()
            .set_comment(Some("router name".into()));

        let changes = comment_changes(&base, &edited);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, p(&["system", "host-name"]));

        let mut moved = base.clone();
        set(&schema, &mut moved, &["system", "time-zone", "UTC"]);
        apply_comments(&mut moved, &changes);
        assert_eq!(moved.get(&p(&["system", "host-name"])).unwrap().comment(), Some("router name"));
        assert_ne!(base, edited);
    }

    #[test]
    fn test_settle_lifts_value_comment() {
        let schema = sample_schema();
        let mut tree = ConfigNode::new();
        set(&schema, &mut tree, &["system", "host-name", "r1"]);
        tree.get_mut(&p(&["system", "host-name", "r1"]))
            .unwrap()
            .set_comment(Some("name".into()));

        settle_comments(&schema, &mut tree);
        assert_eq!(tree.get(&p(&["system", "host-name"])).unwrap().comment(), Some("name"));
        assert_eq!(tree.get(&p(&["system", "host-name", "r1"])).unwrap().comment(), None);
    }

    #[test]
    fn test_equality_ignores_order() {
        let mut a = ConfigNode::new();
        a.ensure(&p(&["x", "1"]));
        a.ensure(&p(&["x", "2"]));
        let mut b = ConfigNode::new();
        b.ensure(&p(&["x", "2"]));
        b.ensure(&p(&["x", "1"]));
        assert_eq!(a, b);
    }
}
