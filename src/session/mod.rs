//! Session Manager.
//!
//! # Data Flow
//! ```text
//! session_setup(id)
//!     → Session { base: running snapshot, candidate: copy of running }
//!     → edits mutate the candidate only
//!     → before every use: rebase onto the current running tree
//!     → commit publishes the candidate; teardown drops it
//! ```
//!
//! # Design Decisions
//! - Sessions live in a `DashMap`; edits to different sessions never
//!   contend on a shared lock
//! - A candidate remembers the running snapshot it forked from. When
//!   another session commits, the session's own edits (diff of base to
//!   candidate) are replayed onto the new running tree, so a commit never
//!   silently reverts someone else's work
//! - `lock` is an advisory flag, not a mutex

use dashmap::DashMap;
use std::sync::Arc;

use crate::error::{ConfigdError, ConfigdResult};
use crate::observability::metrics;
use crate::schema::Schema;
use crate::tree::{apply_comments, comment_changes, diff, replay, ConfigNode};

/// One client's editing context.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    locked: bool,
    saved: bool,
    base: Arc<ConfigNode>,
    candidate: ConfigNode,
}

impl Session {
    fn new(id: String, running: Arc<ConfigNode>) -> Self {
        let candidate = (*running).clone();
        Self {
            id,
            locked: false,
            saved: false,
            base: running,
            candidate,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn locked(&self) -> bool {
        self.locked
    }

    pub fn saved(&self) -> bool {
        self.saved
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn set_saved(&mut self, saved: bool) {
        self.saved = saved;
    }

    pub fn candidate(&self) -> &ConfigNode {
        &self.candidate
    }

    pub fn candidate_mut(&mut self) -> &mut ConfigNode {
        &mut self.candidate
    }

    /// Carry this session's edits over to `running` if it moved.
    pub fn rebase(&mut self, schema: &Schema, running: &Arc<ConfigNode>) {
        if Arc::ptr_eq(&self.base, running) {
            return;
        }
        let edits = diff(schema, &self.base, &self.candidate);
        let comments = comment_changes(&self.base, &self.candidate);
        let mut candidate = (**running).clone();
        replay(schema, &mut candidate, &edits);
        apply_comments(&mut candidate, &comments);
        tracing::debug!(
            session = %self.id,
            edits = edits.len(),
            "Rebased candidate onto new running configuration"
        );
        self.candidate = candidate;
        self.base = Arc::clone(running);
    }

    /// Drop all edits.
    pub fn discard(&mut self, running: &Arc<ConfigNode>) {
        self.candidate = (**running).clone();
        self.base = Arc::clone(running);
    }

    /// Record that `running` now holds what this session committed.
    pub fn committed(&mut self, running: &Arc<ConfigNode>) {
        self.base = Arc::clone(running);
        self.saved = false;
    }

    pub fn changed(&self, running: &ConfigNode) -> bool {
        self.candidate != *running
    }
}

/// Registry of live sessions keyed by caller-supplied id.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: DashMap<String, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create session `id` forked from `running`. Setting up an existing id
    /// rebinds to it unchanged.
    pub fn setup(&self, id: &str, running: Arc<ConfigNode>) -> ConfigdResult<()> {
        if id.is_empty() {
            return Err(ConfigdError::InvalidArgument(
                "must specify a session identifier".to_string(),
            ));
        }
        let mut created = false;
        self.sessions.entry(id.to_string()).or_insert_with(|| {
            created = true;
            Session::new(id.to_string(), running)
        });
        if created {
            tracing::info!(session = %id, "Session created");
            metrics::record_sessions_active(self.sessions.len());
        } else {
            tracing::debug!(session = %id, "Session rebound");
        }
        Ok(())
    }

    pub fn teardown(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            tracing::info!(session = %id, "Session torn down");
            metrics::record_sessions_active(self.sessions.len());
        }
        removed
    }

    pub fn exists(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Read a session; `None` if it does not exist.
    pub fn read<R>(&self, id: &str, f: impl FnOnce(&Session) -> R) -> Option<R> {
        self.sessions.get(id).map(|session| f(&session))
    }

    /// Mutate a session, failing with `NotFound` if it does not exist.
    ///
    /// The closure runs under the map's shard lock and must not block.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> ConfigdResult<R> {
        self.sessions
            .get_mut(id)
            .map(|mut session| f(&mut session))
            .ok_or_else(|| ConfigdError::no_session(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{p, sample_schema};
    use crate::tree::apply_set;

    #[test]
    fn test_empty_id_rejected() {
        let manager = SessionManager::new();
        let err = manager.setup("", Arc::new(ConfigNode::new())).unwrap_err();
        assert!(matches!(err, ConfigdError::InvalidArgument(_)));
        assert_eq!(manager.count(), 0);
    }

    #[test]
    fn test_setup_is_idempotent() {
        let schema = sample_schema();
        let manager = SessionManager::new();
        let running = Arc::new(ConfigNode::new());
        manager.setup("s1", Arc::clone(&running)).unwrap();
        manager
            .update("s1", |s| apply_set(&schema, s.candidate_mut(), &p(&["system", "host-name", "r1"])))
            .unwrap();

        manager.setup("s1", Arc::clone(&running)).unwrap();
        assert_eq!(manager.count(), 1);
        assert_eq!(manager.read("s1", |s| s.changed(&running)), Some(true));
    }

    #[test]
    fn test_flags_toggle() {
        let manager = SessionManager::new();
        manager.setup("s1", Arc::new(ConfigNode::new())).unwrap();

        manager.update("s1", |s| s.set_locked(true)).unwrap();
        assert_eq!(manager.read("s1", Session::locked), Some(true));
        manager.update("s1", |s| s.set_locked(false)).unwrap();
        manager.update("s1", |s| s.set_locked(false)).unwrap();
        assert_eq!(manager.read("s1", Session::locked), Some(false));

        manager.update("s1", |s| s.set_saved(true)).unwrap();
        assert_eq!(manager.read("s1", Session::saved), Some(true));
    }

    #[test]
    fn test_missing_session() {
        let manager = SessionManager::new();
        assert_eq!(manager.read("nope", Session::locked), None);
        let err = manager.update("nope", |s| s.set_locked(true)).unwrap_err();
        assert_eq!(err.to_string(), "session nope does not exist");
        assert!(!manager.teardown("nope"));
    }

    #[test]
    fn test_rebase_keeps_own_edits() {
        let schema = sample_schema();
        let manager = SessionManager::new();
        let running = Arc::new(ConfigNode::new());
        manager.setup("s1", Arc::clone(&running)).unwrap();
        manager
            .update("s1", |s| apply_set(&schema, s.candidate_mut(), &p(&["system", "host-name", "r1"])))
            .unwrap();

        let mut next = ConfigNode::new();
        apply_set(&schema, &mut next, &p(&["system", "time-zone", "UTC"]));
        let next = Arc::new(next);

        manager.update("s1", |s| s.rebase(&schema, &next)).unwrap();
        let candidate = manager.read("s1", |s| s.candidate().clone()).unwrap();
        assert!(candidate.contains(&p(&["system", "host-name", "r1"])));
        assert!(candidate.contains(&p(&["system", "time-zone", "UTC"])));
    }

    #[test]
    fn test_rebase_keeps_comments() {
        let schema = sample_schema();
        let manager = SessionManager::new();
        let mut base = ConfigNode::new();
        apply_set(&schema, &mut base, &p(&["system", "host-name", "r1"]));
        let base = Arc::new(base);
        manager.setup("s1", Arc::clone(&base)).unwrap();
        manager
            .update("s1", |s| {
                if let Some(node) = s.candidate_mut().get_mut(&p(&["system"])) {
                    node.set_comment(Some("core".into()));
                }
            })
            .unwrap();

        let mut next = (*base).clone();
        apply_set(&schema, &mut next, &p(&["system", "time-zone", "UTC"]));
        let next = Arc::new(next);

        manager.update("s1", |s| s.rebase(&schema, &next)).unwrap();
        let candidate = manager.read("s1", |s| s.candidate().clone()).unwrap();
        assert_eq!(candidate.get(&p(&["system"])).unwrap().comment(), Some("core"));
        assert!(candidate.contains(&p(&["system", "time-zone", "UTC"])));
    }
}
