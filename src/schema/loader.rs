//! Schema definition loading.
//!
//! Definitions are TOML documents of nested `children` tables:
//!
//! ```toml
//! [children.system.children.ntp]
//! help = "Network Time Protocol (NTP) configuration"
//! action = "service ntp restart"
//!
//! [children.system.children.ntp.children.server]
//! kind = "tag"
//! type = "txt"
//! help = "Network Time Protocol (NTP) server"
//! ```
//!
//! `kind` defaults to `container` for nodes with children and `leaf`
//! otherwise. A leaf without `type`, `allowed`, or `pattern` is a valueless
//! presence flag.

use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::schema::node::{Children, NodeKind, SchemaNode};
use crate::schema::types::{ValuePattern, ValueSpec, ValueType};

/// Errors raised while loading a schema definition.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse schema: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{path}: unknown value type '{name}'")]
    UnknownType { path: String, name: String },

    #[error("{path}: invalid pattern: {source}")]
    InvalidPattern {
        path: String,
        #[source]
        source: regex::Error,
    },

    #[error("{path}: default '{value}' is not an accepted value")]
    InvalidDefault { path: String, value: String },

    #[error("{path}: {reason}")]
    Malformed { path: String, reason: &'static str },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaDef {
    #[serde(default)]
    children: IndexMap<String, NodeDef>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum KindDef {
    Leaf,
    Multi,
    Container,
    Tag,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatternDef {
    regex: String,
    display: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeDef {
    kind: Option<KindDef>,
    #[serde(default)]
    help: String,
    #[serde(rename = "type")]
    ty: Option<String>,
    range: Option<[u32; 2]>,
    #[serde(default)]
    allowed: Vec<String>,
    #[serde(default)]
    pattern: Vec<PatternDef>,
    default: Option<String>,
    priority: Option<u32>,
    action: Option<String>,
    #[serde(default)]
    presence: bool,
    #[serde(default)]
    children: IndexMap<String, NodeDef>,
}

/// Read and compile a schema definition file into top-level nodes.
pub fn load_schema_file(path: &Path) -> Result<Children, SchemaError> {
    let content = fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_schema(&content)
}

/// Compile a schema definition held in memory.
pub fn parse_schema(content: &str) -> Result<Children, SchemaError> {
    let def: SchemaDef = toml::from_str(content)?;
    compile_children(def.children, &[])
}

fn compile_children(
    defs: IndexMap<String, NodeDef>,
    parent: &[String],
) -> Result<Children, SchemaError> {
    let mut children = Children::with_capacity(defs.len());
    for (name, def) in defs {
        let mut path = parent.to_vec();
        path.push(name.clone());
        let node = compile_node(name.clone(), def, &path)?;
        children.insert(name, node);
    }
    Ok(children)
}

fn compile_node(name: String, def: NodeDef, path: &[String]) -> Result<SchemaNode, SchemaError> {
    let location = path.join(" ");

    let ty = match def.ty.as_deref() {
        Some(type_name) => Some(ValueType::parse(type_name, def.range).ok_or_else(|| {
            SchemaError::UnknownType {
                path: location.clone(),
                name: type_name.to_string(),
            }
        })?),
        None => None,
    };

    let patterns = def
        .pattern
        .iter()
        .map(|p| ValuePattern::new(&p.regex, p.display.clone()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| SchemaError::InvalidPattern {
            path: location.clone(),
            source,
        })?;

    let spec = ValueSpec {
        ty,
        allowed: def.allowed,
        patterns,
        default: def.default,
    };

    if let Some(value) = &spec.default {
        if !spec.accepts(value) {
            return Err(SchemaError::InvalidDefault {
                path: location,
                value: value.clone(),
            });
        }
    }

    let kind = match def.kind {
        Some(kind) => kind,
        None if !def.children.is_empty() => KindDef::Container,
        None => KindDef::Leaf,
    };

    let kind = match kind {
        KindDef::Container => {
            if spec.takes_value() {
                return Err(SchemaError::Malformed {
                    path: location,
                    reason: "containers do not take values",
                });
            }
            NodeKind::Container(compile_children(def.children, path)?)
        }
        KindDef::Tag => {
            let mut key = spec;
            if !key.takes_value() {
                key.ty = Some(ValueType::Txt);
            }
            NodeKind::Tag {
                key,
                entry: compile_children(def.children, path)?,
            }
        }
        KindDef::Leaf | KindDef::Multi => {
            if !def.children.is_empty() {
                return Err(SchemaError::Malformed {
                    path: location,
                    reason: "leaf and multi nodes cannot have children",
                });
            }
            if matches!(kind, KindDef::Multi) {
                if !spec.takes_value() {
                    return Err(SchemaError::Malformed {
                        path: location,
                        reason: "multi nodes need a value type",
                    });
                }
                NodeKind::Multi(spec)
            } else {
                NodeKind::Leaf(spec)
            }
        }
    };

    Ok(SchemaNode {
        name,
        help: def.help,
        priority: def.priority,
        action: def.action,
        presence: def.presence,
        kind,
    })
}
