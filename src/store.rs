//! The daemon-wide configuration store.
//!
//! # Responsibilities
//! - Own the schema, the running tree, every session, and the commit pipeline
//! - Implement each client operation against explicitly passed state
//! - Serialize commits; everything else runs concurrently
//!
//! # Design Decisions
//! - Running is an `ArcSwap`: readers take a snapshot without locking and a
//!   commit publishes a new tree with one pointer store
//! - A second concurrent commit gets `Busy` at once instead of queueing
//! - Sessions are rebased onto the current running tree before any use
//! - A confirmed commit keeps the running tree it replaced under the commit
//!   lock. Unless a plain commit confirms it before the timer fires, that
//!   tree is restored through the commit pipeline

use arc_swap::ArcSwap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::commit::{validate_changes, CommitPipeline};
use crate::error::{ConfigdError, ConfigdResult, Operation};
use crate::observability::metrics;
use crate::persistence;
use crate::schema::{NodeKind, NodeType, Position, Schema};
use crate::session::{Session, SessionManager};
use crate::tree::{self, diff, replay, view, ConfigNode, NodeStatus};

/// Which tree a read query looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    /// Committed configuration only.
    Running,
    /// The session's candidate; empty when the session does not exist.
    Candidate,
    /// The session's candidate when it exists, running otherwise.
    Auto,
}

/// A commit that is reverted unless confirmed in time.
struct PendingConfirm {
    id: Uuid,
    previous: Arc<ConfigNode>,
    timer: JoinHandle<()>,
}

pub struct ConfigStore {
    schema: Arc<Schema>,
    running: ArcSwap<ConfigNode>,
    sessions: SessionManager,
    commit_lock: tokio::sync::Mutex<Option<PendingConfirm>>,
    pipeline: CommitPipeline,
    boot_config_path: PathBuf,
}

impl ConfigStore {
    pub fn new(schema: Arc<Schema>, pipeline: CommitPipeline, boot_config_path: impl Into<PathBuf>) -> Self {
        Self {
            schema,
            running: ArcSwap::from_pointee(ConfigNode::new()),
            sessions: SessionManager::new(),
            commit_lock: tokio::sync::Mutex::new(None),
            pipeline,
            boot_config_path: boot_config_path.into(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Snapshot of the committed configuration.
    pub fn running(&self) -> Arc<ConfigNode> {
        self.running.load_full()
    }

    pub fn boot_config_path(&self) -> &Path {
        &self.boot_config_path
    }

    pub fn session_count(&self) -> usize {
        self.sessions.count()
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub fn session_setup(&self, sid: &str) -> ConfigdResult<()> {
        self.sessions.setup(sid, self.running())
    }

    pub fn session_teardown(&self, sid: &str) -> bool {
        self.sessions.teardown(sid)
    }

    pub fn session_exists(&self, sid: &str) -> bool {
        self.sessions.exists(sid)
    }

    pub fn session_lock(&self, sid: &str) -> ConfigdResult<()> {
        self.sessions.update(sid, |s| s.set_locked(true))
    }

    pub fn session_unlock(&self, sid: &str) -> ConfigdResult<()> {
        self.sessions.update(sid, |s| s.set_locked(false))
    }

    pub fn session_locked(&self, sid: &str) -> bool {
        self.sessions.read(sid, Session::locked).unwrap_or(false)
    }

    pub fn session_mark_saved(&self, sid: &str) -> ConfigdResult<()> {
        self.sessions.update(sid, |s| s.set_saved(true))
    }

    pub fn session_mark_unsaved(&self, sid: &str) -> ConfigdResult<()> {
        self.sessions.update(sid, |s| s.set_saved(false))
    }

    pub fn session_saved(&self, sid: &str) -> bool {
        self.sessions.read(sid, Session::saved).unwrap_or(false)
    }

    /// True when the candidate differs from running right now.
    pub fn session_changed(&self, sid: &str) -> bool {
        let running = self.running();
        self.with_session(sid, &running, |s| s.changed(&running))
            .unwrap_or(false)
    }

    /// Rebase session `sid` onto `running`, then hand it to `f`.
    fn with_session<R>(
        &self,
        sid: &str,
        running: &Arc<ConfigNode>,
        f: impl FnOnce(&mut Session) -> R,
    ) -> ConfigdResult<R> {
        let schema = &self.schema;
        self.sessions.update(sid, |session| {
            session.rebase(schema, running);
            f(session)
        })
    }

    fn edit<R>(&self, sid: &str, f: impl FnOnce(&Schema, &mut ConfigNode) -> R) -> ConfigdResult<R> {
        let running = self.running();
        let schema = &self.schema;
        self.with_session(sid, &running, |s| f(schema, s.candidate_mut()))
    }

    fn require_session(&self, sid: &str) -> ConfigdResult<()> {
        if self.sessions.exists(sid) {
            Ok(())
        } else {
            Err(ConfigdError::no_session(sid))
        }
    }

    // ------------------------------------------------------------------
    // Candidate edits
    // ------------------------------------------------------------------

    pub fn set(&self, sid: &str, path: &[String]) -> ConfigdResult<()> {
        self.require_session(sid)?;
        if let Err(fault) = self.schema.validate_complete(path) {
            let diag = fault.diagnostic(path).during(Operation::Set);
            tracing::debug!(session = %sid, path = %path.join(" "), "Set rejected");
            return Err(diag.into());
        }
        self.edit(sid, |schema, candidate| tree::apply_set(schema, candidate, path))
    }

    /// Remove `path` from the candidate. Absent but valid paths are a no-op.
    pub fn delete(&self, sid: &str, path: &[String]) -> ConfigdResult<()> {
        self.require_session(sid)?;
        if path.is_empty() {
            return Err(ConfigdError::InvalidArgument(
                "must specify a configuration path".to_string(),
            ));
        }
        if let Err(fault) = self.schema.validate(path) {
            let diag = fault.diagnostic(path).during(Operation::Delete);
            tracing::debug!(session = %sid, path = %path.join(" "), "Delete rejected");
            return Err(diag.into());
        }
        let removed = self.edit(sid, |schema, candidate| tree::apply_delete(schema, candidate, path))?;
        if !removed {
            tracing::debug!(session = %sid, path = %path.join(" "), "Delete of absent path");
        }
        Ok(())
    }

    /// Full structural and value check of `path`; touches no tree.
    pub fn validate_path(&self, path: &[String]) -> ConfigdResult<()> {
        self.schema
            .validate(path)
            .map(|_| ())
            .map_err(|fault| fault.diagnostic(path).into())
    }

    /// Check every pending change of the session.
    pub fn validate(&self, sid: &str) -> ConfigdResult<()> {
        let running = self.running();
        let changes = self.with_session(sid, &running, |s| diff(&self.schema, &running, s.candidate()))?;
        validate_changes(&self.schema, &changes, Operation::Validate)?;
        Ok(())
    }

    pub fn discard(&self, sid: &str) -> ConfigdResult<()> {
        let running = self.running();
        self.sessions.update(sid, |s| s.discard(&running))
    }

    /// Move a tag entry within the candidate.
    pub fn rename(&self, sid: &str, from: &[String], to: &[String]) -> ConfigdResult<()> {
        self.transplant(sid, from, to, Operation::Rename)
    }

    /// Duplicate a tag entry within the candidate.
    pub fn copy(&self, sid: &str, from: &[String], to: &[String]) -> ConfigdResult<()> {
        self.transplant(sid, from, to, Operation::Copy)
    }

    fn transplant(&self, sid: &str, from: &[String], to: &[String], op: Operation) -> ConfigdResult<()> {
        self.require_session(sid)?;
        for path in [from, to] {
            let resolved = self
                .schema
                .validate(path)
                .map_err(|fault| fault.diagnostic(path).during(op))?;
            if resolved.position != Position::Entry {
                return Err(ConfigdError::InvalidArgument(format!(
                    "{} is not an entry of a tag node",
                    path.join(" ")
                )));
            }
        }
        if from[..from.len() - 1] != to[..to.len() - 1] {
            return Err(ConfigdError::InvalidArgument(
                "source and destination must be entries of the same tag node".to_string(),
            ));
        }

        self.edit(sid, |_, candidate| {
            if candidate.contains(to) {
                return Err(ConfigdError::InvalidArgument(format!(
                    "{} already exists",
                    to.join(" ")
                )));
            }
            let entry = match op {
                Operation::Rename => candidate.remove(from),
                _ => candidate.get(from).cloned(),
            };
            let entry =
                entry.ok_or_else(|| ConfigdError::NotFound(format!("{} does not exist", from.join(" "))))?;
            candidate.insert(to, entry);
            Ok(())
        })?
    }

    /// Attach `text` to the candidate node at `path`; empty text removes
    /// the comment. A leaf value path comments the leaf.
    pub fn comment(&self, sid: &str, path: &[String], text: &str) -> ConfigdResult<()> {
        self.require_session(sid)?;
        if text.contains("*/") {
            return Err(ConfigdError::InvalidArgument(
                "comment cannot contain \"*/\"".to_string(),
            ));
        }
        let target = self.comment_target(path)?;
        let comment = (!text.is_empty()).then(|| text.to_string());
        self.edit(sid, |_, candidate| match candidate.get_mut(target) {
            Some(node) => {
                node.set_comment(comment);
                Ok(())
            }
            None => Err(ConfigdError::NotFound(format!("{} does not exist", path.join(" ")))),
        })?
    }

    /// Where a comment on `path` is stored.
    fn comment_target<'p>(&self, path: &'p [String]) -> ConfigdResult<&'p [String]> {
        if path.is_empty() {
            return Err(ConfigdError::InvalidArgument(
                "must specify a configuration path".to_string(),
            ));
        }
        let resolved = self
            .schema
            .validate(path)
            .map_err(|fault| fault.diagnostic(path).during(Operation::Comment))?;
        match (&resolved.node.kind, resolved.position) {
            (NodeKind::Leaf(_), Position::Value) => Ok(&path[..path.len() - 1]),
            (NodeKind::Tag { .. } | NodeKind::Multi(_), Position::Node) => {
                Err(ConfigdError::InvalidArgument(format!(
                    "{} has no line of its own, comment one of its entries",
                    path.join(" ")
                )))
            }
            _ => Ok(path),
        }
    }

    // ------------------------------------------------------------------
    // Commit and persistence
    // ------------------------------------------------------------------

    /// Validate, run actions for, and publish the session's candidate.
    ///
    /// A successful commit also confirms a pending confirmed commit.
    pub async fn commit(&self, sid: &str, comment: &str) -> ConfigdResult<String> {
        let started = Instant::now();
        let Ok(mut pending) = self.commit_lock.try_lock() else {
            return Err(Self::busy(sid, started));
        };

        let output = self.publish(sid, comment, started).await?;
        if let Some(confirm) = pending.take() {
            confirm.timer.abort();
            tracing::info!(commit_id = %confirm.id, session = %sid, "Confirmed commit accepted");
        }
        Ok(output)
    }

    /// Commit, then restore the replaced running tree after `timeout`
    /// unless a plain [`commit`](Self::commit) confirms it first.
    ///
    /// Stacked confirmed commits revert to the tree in place before the
    /// first of them.
    pub async fn confirmed_commit(
        self: &Arc<Self>,
        sid: &str,
        comment: &str,
        timeout: Duration,
    ) -> ConfigdResult<String> {
        let started = Instant::now();
        let Ok(mut pending) = self.commit_lock.try_lock() else {
            return Err(Self::busy(sid, started));
        };

        let before = self.running();
        let output = self.publish(sid, comment, started).await?;

        let previous = match pending.take() {
            Some(earlier) => {
                earlier.timer.abort();
                earlier.previous
            }
            None => before,
        };
        let id = Uuid::new_v4();
        let store = Arc::downgrade(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            revert_on_expiry(store, id).await;
        });
        *pending = Some(PendingConfirm { id, previous, timer });

        tracing::info!(commit_id = %id, session = %sid, timeout = ?timeout, "Commit awaits confirmation");
        Ok(output)
    }

    /// Revert a pending confirmed commit now.
    pub async fn cancel_commit(&self, sid: &str) -> ConfigdResult<String> {
        self.require_session(sid)?;
        let started = Instant::now();
        let Ok(mut pending) = self.commit_lock.try_lock() else {
            return Err(Self::busy(sid, started));
        };
        let Some(confirm) = pending.as_ref() else {
            return Err(ConfigdError::InvalidArgument(
                "no confirmed commit is pending".to_string(),
            ));
        };

        let output = self.revert(confirm, started).await?;
        if let Some(confirm) = pending.take() {
            confirm.timer.abort();
            tracing::info!(commit_id = %confirm.id, session = %sid, "Confirmed commit cancelled");
        }
        Ok(output)
    }

    fn busy(sid: &str, started: Instant) -> ConfigdError {
        metrics::record_commit("busy", started.elapsed());
        tracing::warn!(session = %sid, "Commit rejected, another commit is in progress");
        ConfigdError::Busy
    }

    /// Run the pipeline for the session's candidate and publish it.
    /// The caller holds the commit lock.
    async fn publish(&self, sid: &str, comment: &str, started: Instant) -> ConfigdResult<String> {
        let running = self.running();
        let candidate = self.with_session(sid, &running, |s| s.candidate().clone())?;
        let commit_id = Uuid::new_v4();
        tracing::info!(%commit_id, session = %sid, comment, "Commit started");

        let report = match self.pipeline.run(&self.schema, &running, &candidate).await {
            Ok(report) => report,
            Err(err) => {
                let outcome = match err {
                    ConfigdError::InvalidPath(_) => "invalid",
                    _ => "failed",
                };
                metrics::record_commit(outcome, started.elapsed());
                tracing::warn!(%commit_id, session = %sid, outcome, "Commit aborted, running configuration unchanged");
                return Err(err);
            }
        };

        // Comment edits publish without any change record.
        if report.changes == 0 && candidate == *running {
            metrics::record_commit("empty", started.elapsed());
            tracing::info!(%commit_id, session = %sid, "Nothing to commit");
            return Ok(report.output);
        }

        let next = Arc::new(candidate);
        self.running.store(Arc::clone(&next));
        // The session may have been torn down while actions ran.
        let _ = self.sessions.update(sid, |s| s.committed(&next));

        let elapsed = started.elapsed();
        metrics::record_commit("applied", elapsed);
        tracing::info!(
            %commit_id,
            session = %sid,
            changes = report.changes,
            elapsed_ms = elapsed.as_millis() as u64,
            "Commit applied"
        );
        Ok(report.output)
    }

    /// Restore the running tree a confirmed commit replaced.
    /// The caller holds the commit lock.
    async fn revert(&self, confirm: &PendingConfirm, started: Instant) -> ConfigdResult<String> {
        let current = self.running();
        let report = match self.pipeline.run(&self.schema, &current, &confirm.previous).await {
            Ok(report) => report,
            Err(err) => {
                metrics::record_commit("failed", started.elapsed());
                tracing::error!(commit_id = %confirm.id, error = %err, "Revert of confirmed commit failed");
                return Err(err);
            }
        };

        self.running.store(Arc::clone(&confirm.previous));
        metrics::record_commit("reverted", started.elapsed());
        tracing::warn!(commit_id = %confirm.id, changes = report.changes, "Confirmed commit reverted");
        Ok(report.output)
    }

    /// Write running to the boot-configuration file.
    pub async fn save(&self) -> ConfigdResult<()> {
        self.save_to(&self.boot_config_path).await
    }

    pub async fn save_to(&self, path: &Path) -> ConfigdResult<()> {
        let running = self.running();
        persistence::save_file(&self.schema, &running, path).await
    }

    /// Replace the session's candidate with the contents of `path`.
    pub async fn load(&self, sid: &str, path: &Path) -> ConfigdResult<()> {
        self.require_session(sid)?;
        let mut loaded = persistence::load_file(path).await?;
        tree::settle_comments(&self.schema, &mut loaded);
        self.edit(sid, |_, candidate| *candidate = loaded)
    }

    /// Apply the contents of `path` on top of the session's candidate.
    pub async fn merge(&self, sid: &str, path: &Path) -> ConfigdResult<()> {
        self.require_session(sid)?;
        let mut loaded = persistence::load_file(path).await?;
        tree::settle_comments(&self.schema, &mut loaded);
        let changes = diff(&self.schema, &ConfigNode::new(), &loaded);
        let comments = tree::comment_changes(&ConfigNode::new(), &loaded);
        self.edit(sid, |schema, candidate| {
            replay(schema, candidate, &changes);
            tree::apply_comments(candidate, &comments);
        })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The tree a read in `scope` sees.
    fn tree(&self, sid: &str, scope: Scope) -> Arc<ConfigNode> {
        let running = self.running();
        if scope == Scope::Running {
            return running;
        }
        match self.with_session(sid, &running, |s| s.candidate().clone()) {
            Ok(candidate) => Arc::new(candidate),
            Err(_) if scope == Scope::Auto => running,
            Err(_) => Arc::new(ConfigNode::new()),
        }
    }

    pub fn node_exists(&self, sid: &str, scope: Scope, path: &[String]) -> bool {
        view::exists(&self.schema, &self.tree(sid, scope), path)
    }

    pub fn node_is_default(&self, sid: &str, scope: Scope, path: &[String]) -> bool {
        view::is_default(&self.schema, &self.tree(sid, scope), path)
    }

    pub fn node_get(&self, sid: &str, scope: Scope, path: &[String]) -> Vec<String> {
        view::children(&self.schema, &self.tree(sid, scope), path)
    }

    /// Comment of the node at `path` in `scope`.
    pub fn node_get_comment(&self, sid: &str, scope: Scope, path: &[String]) -> Option<String> {
        let target = self.comment_target(path).ok()?;
        let tree = self.tree(sid, scope);
        tree.get(target)?.comment().map(str::to_string)
    }

    pub fn node_get_type(&self, path: &[String]) -> Option<NodeType> {
        self.schema.node_type(path)
    }

    /// How the tree in `scope` differs from running at `path`.
    pub fn node_get_status(&self, sid: &str, scope: Scope, path: &[String]) -> NodeStatus {
        view::status(&self.running(), &self.tree(sid, scope), path)
    }

    /// Schema-shaped JSON of the subtree at `path`.
    pub fn tree_get(&self, sid: &str, scope: Scope, path: &[String]) -> Option<serde_json::Value> {
        let tree = self.tree(sid, scope);
        let node = tree.get(path)?;
        Some(to_json(&self.schema, &mut path.to_vec(), node))
    }

    /// Boot-configuration text of the subtree at `path`.
    pub fn show(&self, sid: &str, scope: Scope, path: &[String]) -> String {
        let tree = self.tree(sid, scope);
        tree.get(path)
            .map(|node| persistence::render_at(&self.schema, path, node))
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------

    pub fn template_get(&self, path: &[String]) -> Option<BTreeMap<String, String>> {
        self.schema.template(path)
    }

    pub fn template_get_children(&self, path: &[String]) -> Vec<String> {
        self.schema.children(path)
    }

    pub fn template_get_allowed(&self, path: &[String]) -> Vec<String> {
        self.schema.allowed_values(path)
    }

    pub fn template_validate_path(&self, path: &[String]) -> bool {
        self.schema.validate_path(path)
    }

    pub fn template_validate_values(&self, path: &[String]) -> bool {
        self.schema.validate_values(path)
    }

    /// Help text for what may follow `path`, listing existing entries.
    pub fn get_help(&self, sid: &str, path: &[String], with_pattern: bool) -> IndexMap<String, String> {
        let tree = self.tree(sid, Scope::Auto);
        let existing: Vec<String> = tree
            .get(path)
            .map(|node| {
                tree::ordered_children(&self.schema, path, node)
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        self.schema.help(path, &existing, with_pattern)
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("sessions", &self.sessions.count())
            .field("boot_config_path", &self.boot_config_path)
            .finish_non_exhaustive()
    }
}

/// Timer body of a confirmed commit. A stale `id` means the commit was
/// already settled.
async fn revert_on_expiry(store: Weak<ConfigStore>, id: Uuid) {
    let Some(store) = store.upgrade() else {
        return;
    };
    let mut pending = store.commit_lock.lock().await;
    let Some(confirm) = pending.as_ref().filter(|p| p.id == id) else {
        return;
    };
    tracing::warn!(commit_id = %id, "Commit not confirmed in time");
    if store.revert(confirm, Instant::now()).await.is_ok() {
        *pending = None;
    }
}

fn to_json(schema: &Schema, path: &mut Vec<String>, node: &ConfigNode) -> serde_json::Value {
    use serde_json::Value;

    let kind = schema
        .lookup(path)
        .ok()
        .filter(|r| r.position == Position::Node)
        .map(|r| &r.node.kind);

    match kind {
        Some(NodeKind::Leaf(_)) => node
            .names()
            .next()
            .map_or(Value::Null, |v| Value::String(v.to_string())),
        Some(NodeKind::Multi(_)) => Value::Array(
            tree::ordered_children(schema, path, node)
                .into_iter()
                .map(|v| Value::String(v.to_string()))
                .collect(),
        ),
        _ => {
            let mut object = serde_json::Map::new();
            for name in tree::ordered_children(schema, path, node) {
                let Some(child) = node.child(name) else {
                    continue;
                };
                path.push(name.to_string());
                object.insert(name.to_string(), to_json(schema, path, child));
                path.pop();
            }
            Value::Object(object)
        }
    }
}
