//! Default-aware reads over a configuration tree.
//!
//! Schema defaults are never stored. A leaf with a default whose parent
//! exists in the data reads as holding its default value.

use serde::{Deserialize, Serialize};

use crate::schema::{NodeKind, Position, Schema};
use crate::tree::{order_names, ConfigNode};

/// How the candidate differs from running at one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Unchanged,
    Changed,
    Added,
    Deleted,
}

/// Default value visible at a leaf `path` that holds nothing.
fn visible_default<'s>(schema: &'s Schema, tree: &ConfigNode, path: &[String]) -> Option<&'s str> {
    let (_, parent) = path.split_last()?;
    let resolved = schema.lookup(path).ok()?;
    if resolved.position != Position::Node || tree.contains(path) || !tree.contains(parent) {
        return None;
    }
    resolved.node.default_value()
}

pub fn exists(schema: &Schema, tree: &ConfigNode, path: &[String]) -> bool {
    if tree.contains(path) {
        return true;
    }
    match path.split_last() {
        Some((value, leaf)) => {
            visible_default(schema, tree, path).is_some()
                || visible_default(schema, tree, leaf) == Some(value.as_str())
        }
        None => false,
    }
}

/// True when the schema declares a default here and the data does not
/// override it.
pub fn is_default(schema: &Schema, tree: &ConfigNode, path: &[String]) -> bool {
    let Ok(resolved) = schema.lookup(path) else {
        return false;
    };
    let NodeKind::Leaf(spec) = &resolved.node.kind else {
        return false;
    };
    let Some(default) = spec.default.as_deref() else {
        return false;
    };
    let (leaf_path, asked) = match resolved.position {
        Position::Node => (path, None),
        Position::Value => match path.split_last() {
            Some((value, leaf)) => (leaf, Some(value.as_str())),
            None => return false,
        },
        Position::Entry => return false,
    };
    if asked.is_some_and(|v| v != default) {
        return false;
    }
    match tree.get(leaf_path) {
        None => true,
        Some(leaf) => leaf.names().next().map_or(true, |stored| stored == default),
    }
}

/// Child names or values at `path`, including visible defaults.
pub fn children(schema: &Schema, tree: &ConfigNode, path: &[String]) -> Vec<String> {
    let Some(node) = tree.get(path) else {
        return visible_default(schema, tree, path)
            .map(|value| vec![value.to_string()])
            .unwrap_or_default();
    };

    let mut names: Vec<&str> = node.names().collect();
    let defaulted: Vec<&str> = schema
        .lookup(path)
        .ok()
        .and_then(|r| r.named_children())
        .map(|declared| {
            declared
                .values()
                .filter(|child| child.default_value().is_some() && node.child(&child.name).is_none())
                .map(|child| child.name.as_str())
                .collect()
        })
        .unwrap_or_default();
    names.extend(defaulted);

    order_names(schema, path, names)
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Compare candidate against running at `path`.
pub fn status(running: &ConfigNode, candidate: &ConfigNode, path: &[String]) -> NodeStatus {
    match (running.get(path), candidate.get(path)) {
        (None, Some(_)) => NodeStatus::Added,
        (Some(_), None) => NodeStatus::Deleted,
        (Some(old), Some(new)) if old != new => NodeStatus::Changed,
        _ => NodeStatus::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{p, sample_schema};
    use crate::tree::apply_set;

    fn console_tree(schema: &Schema) -> ConfigNode {
        let mut tree = ConfigNode::new();
        apply_set(schema, &mut tree, &p(&["system", "console", "device", "ttyS0"]));
        tree
    }

    #[test]
    fn test_default_visible_under_existing_parent() {
        let schema = sample_schema();
        let tree = console_tree(&schema);
        let ttys0 = p(&["system", "console", "device", "ttyS0"]);

        assert_eq!(children(&schema, &tree, &ttys0), vec!["speed".to_string()]);
        assert!(exists(&schema, &tree, &p(&["system", "console", "device", "ttyS0", "speed"])));
        assert!(exists(&schema, &tree, &p(&["system", "console", "device", "ttyS0", "speed", "9600"])));
        assert!(!exists(&schema, &tree, &p(&["system", "console", "device", "ttyS0", "speed", "115200"])));
        assert_eq!(
            children(&schema, &tree, &p(&["system", "console", "device", "ttyS0", "speed"])),
            vec!["9600".to_string()]
        );
    }

    #[test]
    fn test_default_hidden_without_parent() {
        let schema = sample_schema();
        let tree = ConfigNode::new();
        assert!(!exists(&schema, &tree, &p(&["system", "time-zone"])));
        assert!(children(&schema, &tree, &p(&["system"])).is_empty());
    }

    #[test]
    fn test_is_default() {
        let schema = sample_schema();
        let mut tree = console_tree(&schema);
        let speed = p(&["system", "console", "device", "ttyS0", "speed"]);

        assert!(is_default(&schema, &tree, &speed));
        apply_set(&schema, &mut tree, &p(&["system", "console", "device", "ttyS0", "speed", "115200"]));
        assert!(!is_default(&schema, &tree, &speed));
        assert!(!is_default(&schema, &tree, &p(&["system", "name-server"])));
    }

    #[test]
    fn test_status() {
        let schema = sample_schema();
        let running = console_tree(&schema);
        let mut candidate = running.clone();
        apply_set(&schema, &mut candidate, &p(&["system", "host-name", "r1"]));

        assert_eq!(status(&running, &candidate, &p(&["system", "host-name"])), NodeStatus::Added);
        assert_eq!(status(&running, &candidate, &p(&["system"])), NodeStatus::Changed);
        assert_eq!(status(&running, &candidate, &p(&["system", "console"])), NodeStatus::Unchanged);
        assert_eq!(status(&candidate, &running, &p(&["system", "host-name"])), NodeStatus::Deleted);
    }
}
