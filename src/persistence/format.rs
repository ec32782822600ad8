//! Boot-configuration rendering.
//!
//! One statement per line, four-space indentation, children in schema
//! declaration order, a node's comment on the line above it:
//!
//! ```text
//! system {
//!     /* primary name */
//!     host-name r1
//!     name-server 10.0.0.1
//!     ntp {
//!         server a.pool {
//!             prefer
//!         }
//!     }
//! }
//! ```

use std::fmt::Write;

use crate::schema::{NodeKind, Position, Schema};
use crate::tree::{ordered_children, ConfigNode};

const INDENT: &str = "    ";

/// Render `tree` as a complete boot-configuration file.
pub fn render(schema: &Schema, tree: &ConfigNode) -> String {
    render_at(schema, &[], tree)
}

/// Render the contents of `node`, which is stored at `path`.
pub fn render_at(schema: &Schema, path: &[String], node: &ConfigNode) -> String {
    let mut out = String::new();
    let mut path = path.to_vec();
    render_children(schema, &mut path, node, 0, &mut out);
    out
}

/// Quote `word` when it would not survive as a bare word.
pub fn quote(word: &str) -> String {
    let bare = !word.is_empty()
        && !word.starts_with("/*")
        && !word
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '{' | '}' | '"' | '\\'));
    if bare {
        return word.to_string();
    }
    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('"');
    for c in word.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

fn line(out: &mut String, depth: usize, words: &[&str], open: bool) {
    let text = words.iter().map(|w| quote(w)).collect::<Vec<_>>().join(" ");
    let _ = write!(out, "{}{text}", INDENT.repeat(depth));
    out.push_str(if open { " {\n" } else { "\n" });
}

fn remark(out: &mut String, depth: usize, comment: Option<&str>) {
    if let Some(text) = comment {
        let _ = writeln!(out, "{}/* {text} */", INDENT.repeat(depth));
    }
}

fn close(out: &mut String, depth: usize) {
    let _ = writeln!(out, "{}}}", INDENT.repeat(depth));
}

/// A named node with contents gets a block; empty structural nodes keep
/// an empty block so they read back as containers.
fn render_block(
    schema: &Schema,
    path: &mut Vec<String>,
    words: &[&str],
    node: &ConfigNode,
    depth: usize,
    out: &mut String,
) {
    remark(out, depth, node.comment());
    line(out, depth, words, true);
    render_children(schema, path, node, depth + 1, out);
    close(out, depth);
}

fn render_children(
    schema: &Schema,
    path: &mut Vec<String>,
    node: &ConfigNode,
    depth: usize,
    out: &mut String,
) {
    for name in ordered_children(schema, path, node) {
        let Some(child) = node.child(name) else {
            continue;
        };
        path.push(name.to_string());

        let kind = schema
            .lookup(path)
            .ok()
            .filter(|r| r.position == Position::Node)
            .map(|r| &r.node.kind);

        match kind {
            Some(NodeKind::Container(_)) => render_block(schema, path, &[name], child, depth, out),
            Some(NodeKind::Tag { .. }) => {
                for key in ordered_children(schema, path, child) {
                    let Some(entry) = child.child(key) else {
                        continue;
                    };
                    path.push(key.to_string());
                    if entry.is_empty() {
                        remark(out, depth, entry.comment());
                        line(out, depth, &[name, key], false);
                    } else {
                        render_block(schema, path, &[name, key], entry, depth, out);
                    }
                    path.pop();
                }
            }
            Some(NodeKind::Leaf(_) | NodeKind::Multi(_)) => {
                let values = ordered_children(schema, path, child);
                if values.is_empty() {
                    remark(out, depth, child.comment());
                    line(out, depth, &[name], false);
                }
                for (index, value) in values.into_iter().enumerate() {
                    let own = child.child(value).and_then(ConfigNode::comment);
                    let comment = if index == 0 { own.or(child.comment()) } else { own };
                    remark(out, depth, comment);
                    line(out, depth, &[name, value], false);
                }
            }
            None if child.is_empty() => {
                remark(out, depth, child.comment());
                line(out, depth, &[name], false);
            }
            None => render_block(schema, path, &[name], child, depth, out),
        }
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::parser::parse_config;
    use crate::testing::{p, sample_schema};
    use crate::tree::apply_set;

    #[test]
    fn test_render_layout() {
        let schema = sample_schema();
        let mut tree = ConfigNode::new();
        for path in [
            &["system", "ntp", "server", "a.pool", "prefer"][..],
            &["system", "ntp", "server", "b.pool"],
            &["system", "name-server", "10.0.0.1"],
            &["system", "host-name", "r1"],
            &["service", "ssh"],
        ] {
            apply_set(&schema, &mut tree, &p(path));
        }

        assert_eq!(
            render(&schema, &tree),
            "service {\n    ssh {\n    }\n}\n\
             system {\n    host-name r1\n    name-server 10.0.0.1\n    ntp {\n        server a.pool {\n            prefer\n        }\n        server b.pool\n    }\n}\n"
        );
    }

    #[test]
    fn test_comments_render_above_their_line() {
        let schema = sample_schema();
        let mut tree = ConfigNode::new();
        apply_set(&schema, &mut tree, &p(&["system", "host-name", "r1"]));
        apply_set(&schema, &mut tree, &p(&["system", "ntp", "server", "a.pool"]));
        for (path, text) in [
            (&["system"][..], "core"),
            (&["system", "host-name"], "primary name"),
            (&["system", "ntp", "server", "a.pool"], "upstream"),
        ] {
            tree.get_mut(&p(path)).unwrap().set_comment(Some(text.into()));
        }

        let text = render(&schema, &tree);
        assert_eq!(
            text,
            "/* core */\nsystem {\n    /* primary name */\n    host-name r1\n    ntp {\n        /* upstream */\n        server a.pool\n    }\n}\n"
        );

        let mut parsed = parse_config(&text).unwrap();
        crate::tree::settle_comments(&schema, &mut parsed);
        assert_eq!(parsed, tree);
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote("r1"), "r1");
        assert_eq!(quote("Alice Smith"), "\"Alice Smith\"");
        assert_eq!(quote(""), "\"\"");
        assert_eq!(quote("a\"b\\c"), "\"a\\\"b\\\\c\"");
        assert_eq!(quote("two\nlines"), "\"two\\nlines\"");
    }

    #[test]
    fn test_render_then_parse() {
        let schema = sample_schema();
        let mut tree = ConfigNode::new();
        for path in [
            &["system", "login", "user", "alice", "full-name", "Alice \"A\" Smith"][..],
            &["system", "domain-search", "domain", "example.net"],
            &["interfaces", "dataplane", "dp0s3", "address", "10.0.0.1/24"],
            &["service", "ssh", "port", "22"],
        ] {
            apply_set(&schema, &mut tree, &p(path));
        }

        let text = render(&schema, &tree);
        assert_eq!(parse_config(&text).unwrap(), tree);
    }
}
