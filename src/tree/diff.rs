//! Change records between two configuration trees.
//!
//! # Data Flow
//! ```text
//! running + candidate
//!     → diff() (pre-order walk in schema declaration order)
//!     → Vec<ChangeRecord>
//!     → commit validation, action grouping, session rebase (replay())
//! ```
//!
//! # Design Decisions
//! - A container or tag entry that appears or disappears gets its own
//!   record before the records of its contents
//! - A leaf value change is a single `set` carrying the new value
//! - A node that needs a value but holds none yields a valueless `set`,
//!   which commit validation then rejects

use serde::Serialize;
use std::fmt;

use crate::schema::{NodeKind, Position, Schema};
use crate::tree::{apply_delete, apply_set, order_names, ConfigNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Set,
    Delete,
}

/// One set or delete delta at a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    pub path: Vec<String>,
    pub op: ChangeOp,
    /// Value of a leaf or multi node; `None` for structural nodes.
    pub value: Option<String>,
}

impl ChangeRecord {
    fn new(path: &[String], op: ChangeOp, value: Option<&str>) -> Self {
        Self {
            path: path.to_vec(),
            op,
            value: value.map(str::to_string),
        }
    }

    /// Path including the value segment, as a client would address it.
    pub fn full_path(&self) -> Vec<String> {
        let mut path = self.path.clone();
        path.extend(self.value.clone());
        path
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            ChangeOp::Set => "set",
            ChangeOp::Delete => "delete",
        };
        write!(f, "{op} {}", self.full_path().join(" "))
    }
}

/// Every change turning `old` into `new`, in schema pre-order.
pub fn diff(schema: &Schema, old: &ConfigNode, new: &ConfigNode) -> Vec<ChangeRecord> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    walk_children(schema, &mut path, Some(old), Some(new), &mut out);
    out
}

/// Re-apply `changes` onto `onto`.
pub fn replay(schema: &Schema, onto: &mut ConfigNode, changes: &[ChangeRecord]) {
    for change in changes {
        let path = change.full_path();
        match change.op {
            ChangeOp::Set => apply_set(schema, onto, &path),
            ChangeOp::Delete => {
                apply_delete(schema, onto, &path);
            }
        }
    }
}

fn union_names<'a>(
    schema: &Schema,
    path: &[String],
    old: Option<&'a ConfigNode>,
    new: Option<&'a ConfigNode>,
) -> Vec<&'a str> {
    let mut names: Vec<&str> = new.map(|n| n.names().collect()).unwrap_or_default();
    if let Some(old) = old {
        for name in old.names() {
            if new.map_or(true, |n| n.child(name).is_none()) {
                names.push(name);
            }
        }
    }
    order_names(schema, path, names)
}

fn walk_children(
    schema: &Schema,
    path: &mut Vec<String>,
    old: Option<&ConfigNode>,
    new: Option<&ConfigNode>,
    out: &mut Vec<ChangeRecord>,
) {
    for name in union_names(schema, path, old, new) {
        path.push(name.to_string());
        walk_node(
            schema,
            path,
            old.and_then(|n| n.child(name)),
            new.and_then(|n| n.child(name)),
            out,
        );
        path.pop();
    }
}

/// Record presence changes of a structural node, then descend.
fn walk_structural(
    schema: &Schema,
    path: &mut Vec<String>,
    old: Option<&ConfigNode>,
    new: Option<&ConfigNode>,
    out: &mut Vec<ChangeRecord>,
) {
    match (old, new) {
        (None, Some(_)) => out.push(ChangeRecord::new(path, ChangeOp::Set, None)),
        (Some(_), None) => out.push(ChangeRecord::new(path, ChangeOp::Delete, None)),
        _ => {}
    }
    walk_children(schema, path, old, new, out);
}

fn walk_node(
    schema: &Schema,
    path: &mut Vec<String>,
    old: Option<&ConfigNode>,
    new: Option<&ConfigNode>,
    out: &mut Vec<ChangeRecord>,
) {
    let resolved = match schema.lookup(path) {
        Ok(resolved) if resolved.position == Position::Node => resolved,
        _ => return walk_structural(schema, path, old, new, out),
    };

    match &resolved.node.kind {
        NodeKind::Container(_) => walk_structural(schema, path, old, new, out),
        NodeKind::Tag { .. } => {
            flag_missing_value(path, old, new, out);
            for key in union_names(schema, path, old, new) {
                path.push(key.to_string());
                walk_structural(
                    schema,
                    path,
                    old.and_then(|n| n.child(key)),
                    new.and_then(|n| n.child(key)),
                    out,
                );
                path.pop();
            }
        }
        NodeKind::Leaf(spec) if !spec.takes_value() => walk_structural(schema, path, old, new, out),
        NodeKind::Leaf(_) => {
            let old_values: Vec<&str> = old.map(|n| n.names().collect()).unwrap_or_default();
            let new_values: Vec<&str> = new.map(|n| n.names().collect()).unwrap_or_default();
            if old_values == new_values {
                flag_missing_value(path, old, new, out);
                return;
            }
            match (new_values.as_slice(), new) {
                ([], Some(_)) => out.push(ChangeRecord::new(path, ChangeOp::Set, None)),
                ([], None) => {
                    let value = match old_values.as_slice() {
                        [single] => Some(*single),
                        _ => None,
                    };
                    out.push(ChangeRecord::new(path, ChangeOp::Delete, value));
                }
                // More than one value is kept visible so commit validation
                // can reject it.
                (values, _) => {
                    for value in values {
                        out.push(ChangeRecord::new(path, ChangeOp::Set, Some(*value)));
                    }
                }
            }
        }
        NodeKind::Multi(_) => {
            flag_missing_value(path, old, new, out);
            if let Some(old) = old {
                for value in old.names() {
                    if new.map_or(true, |n| n.child(value).is_none()) {
                        out.push(ChangeRecord::new(path, ChangeOp::Delete, Some(value)));
                    }
                }
            }
            if let Some(new) = new {
                for value in new.names() {
                    if old.map_or(true, |n| n.child(value).is_none()) {
                        out.push(ChangeRecord::new(path, ChangeOp::Set, Some(value)));
                    }
                }
            }
        }
    }
}

/// A value-taking node newly present without any value.
fn flag_missing_value(
    path: &[String],
    old: Option<&ConfigNode>,
    new: Option<&ConfigNode>,
    out: &mut Vec<ChangeRecord>,
) {
    if let Some(new) = new {
        if new.is_empty() && old != Some(new) {
            out.push(ChangeRecord::new(path, ChangeOp::Set, None));
        }
    }
}
