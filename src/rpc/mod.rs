//! RPC transport: JSON over HTTP.
//!
//! # Data Flow
//! ```text
//! POST /rpc {"method": "set", "params": {"session": "s1", "path": [...]}}
//!     → handlers.rs (decode Request, call ConfigStore)
//!     → {"result": ...} | {"error": {"kind": ..., "message": ...}}
//!
//! GET /status → daemon version, uptime, open sessions
//! ```
//!
//! # Design Decisions
//! - One endpoint with a tagged request enum; the method list lives in one
//!   type shared by the server and [`client::RpcClient`]
//! - Error kinds map to HTTP status codes, but the JSON body is the contract
//! - Read queries never fail for a missing path, matching the store

pub mod client;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::error::ErrorKind;
use crate::store::{ConfigStore, Scope};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ConfigStore>,
    pub started: Instant,
}

impl AppState {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            store,
            started: Instant::now(),
        }
    }
}

/// Build the RPC router with its middleware layers.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/rpc", post(handlers::rpc))
        .route("/status", get(handlers::status))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
}

fn default_scope() -> Scope {
    Scope::Auto
}

/// Every client operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Request {
    SessionSetup { session: String },
    SessionTeardown { session: String },
    SessionExists { session: String },
    SessionLock { session: String },
    SessionUnlock { session: String },
    SessionLocked { session: String },
    SessionMarkSaved { session: String },
    SessionMarkUnsaved { session: String },
    SessionSaved { session: String },
    SessionChanged { session: String },

    NodeExists {
        session: String,
        #[serde(default = "default_scope")]
        scope: Scope,
        path: Vec<String>,
    },
    NodeIsDefault {
        session: String,
        #[serde(default = "default_scope")]
        scope: Scope,
        path: Vec<String>,
    },
    NodeGet {
        session: String,
        #[serde(default = "default_scope")]
        scope: Scope,
        path: Vec<String>,
    },
    NodeGetType { path: Vec<String> },
    NodeGetComment {
        session: String,
        #[serde(default = "default_scope")]
        scope: Scope,
        path: Vec<String>,
    },
    NodeGetStatus {
        session: String,
        #[serde(default = "default_scope")]
        scope: Scope,
        path: Vec<String>,
    },
    TreeGet {
        session: String,
        #[serde(default = "default_scope")]
        scope: Scope,
        path: Vec<String>,
    },
    Show {
        session: String,
        #[serde(default = "default_scope")]
        scope: Scope,
        path: Vec<String>,
    },

    Set { session: String, path: Vec<String> },
    Delete { session: String, path: Vec<String> },
    Comment {
        session: String,
        path: Vec<String>,
        #[serde(default)]
        comment: String,
    },
    ValidatePath { path: Vec<String> },
    Validate { session: String },
    Discard { session: String },
    Commit {
        session: String,
        #[serde(default)]
        comment: String,
    },
    ConfirmedCommit {
        session: String,
        #[serde(default)]
        comment: String,
        timeout_secs: u64,
    },
    CancelCommit { session: String },
    Save,
    Load { session: String, file: String },
    Merge { session: String, file: String },
    Rename {
        session: String,
        from: Vec<String>,
        to: Vec<String>,
    },
    Copy {
        session: String,
        from: Vec<String>,
        to: Vec<String>,
    },

    TemplateGet { path: Vec<String> },
    TemplateGetChildren { path: Vec<String> },
    TemplateGetAllowed { path: Vec<String> },
    TemplateValidatePath { path: Vec<String> },
    TemplateValidateValues { path: Vec<String> },
    GetHelp {
        session: String,
        path: Vec<String>,
        #[serde(default)]
        with_pattern: bool,
    },
}

impl Request {
    /// Method name as it appears on the wire.
    pub fn method(&self) -> &'static str {
        match self {
            Request::SessionSetup { .. } => "session_setup",
            Request::SessionTeardown { .. } => "session_teardown",
            Request::SessionExists { .. } => "session_exists",
            Request::SessionLock { .. } => "session_lock",
            Request::SessionUnlock { .. } => "session_unlock",
            Request::SessionLocked { .. } => "session_locked",
            Request::SessionMarkSaved { .. } => "session_mark_saved",
            Request::SessionMarkUnsaved { .. } => "session_mark_unsaved",
            Request::SessionSaved { .. } => "session_saved",
            Request::SessionChanged { .. } => "session_changed",
            Request::NodeExists { .. } => "node_exists",
            Request::NodeIsDefault { .. } => "node_is_default",
            Request::NodeGet { .. } => "node_get",
            Request::NodeGetType { .. } => "node_get_type",
            Request::NodeGetComment { .. } => "node_get_comment",
            Request::NodeGetStatus { .. } => "node_get_status",
            Request::TreeGet { .. } => "tree_get",
            Request::Show { .. } => "show",
            Request::Set { .. } => "set",
            Request::Delete { .. } => "delete",
            Request::Comment { .. } => "comment",
            Request::ValidatePath { .. } => "validate_path",
            Request::Validate { .. } => "validate",
            Request::Discard { .. } => "discard",
            Request::Commit { .. } => "commit",
            Request::ConfirmedCommit { .. } => "confirmed_commit",
            Request::CancelCommit { .. } => "cancel_commit",
            Request::Save => "save",
            Request::Load { .. } => "load",
            Request::Merge { .. } => "merge",
            Request::Rename { .. } => "rename",
            Request::Copy { .. } => "copy",
            Request::TemplateGet { .. } => "template_get",
            Request::TemplateGetChildren { .. } => "template_get_children",
            Request::TemplateGetAllowed { .. } => "template_get_allowed",
            Request::TemplateValidatePath { .. } => "template_validate_path",
            Request::TemplateValidateValues { .. } => "template_validate_values",
            Request::GetHelp { .. } => "get_help",
        }
    }
}

/// Failure half of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Body of every `/rpc` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Result(serde_json::Value),
    Error(RpcError),
}
