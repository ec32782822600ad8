use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConfigdError, ConfigdResult, ErrorKind};
use crate::observability::metrics;
use crate::rpc::{AppState, Reply, Request, RpcError};
use crate::store::ConfigStore;

#[derive(Serialize)]
pub struct DaemonStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub sessions: usize,
}

pub async fn status(State(state): State<AppState>) -> Json<DaemonStatus> {
    Json(DaemonStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started.elapsed().as_secs(),
        sessions: state.store.session_count(),
    })
}

fn status_code(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument | ErrorKind::InvalidPath => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Busy => StatusCode::CONFLICT,
        ErrorKind::CommitActionFailed | ErrorKind::PersistenceFailed => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_reply(kind: ErrorKind, message: String) -> Response {
    let body = Reply::Error(RpcError { kind, message });
    (status_code(kind), Json(body)).into_response()
}

pub async fn rpc(
    State(state): State<AppState>,
    request: Result<Json<Request>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "Malformed RPC request");
            metrics::record_rpc("unknown", "rejected");
            return error_reply(ErrorKind::InvalidArgument, rejection.body_text());
        }
    };

    let method = request.method();
    match dispatch(&state.store, request).await {
        Ok(value) => {
            metrics::record_rpc(method, "ok");
            Json(Reply::Result(value)).into_response()
        }
        Err(err) => {
            metrics::record_rpc(method, "error");
            tracing::debug!(method, kind = ?err.kind(), "RPC failed");
            error_reply(err.kind(), err.to_string())
        }
    }
}

fn to_value<T: Serialize>(value: T) -> ConfigdResult<Value> {
    serde_json::to_value(value).map_err(|e| ConfigdError::InvalidArgument(e.to_string()))
}

/// Run one request against the store.
pub async fn dispatch(store: &Arc<ConfigStore>, request: Request) -> ConfigdResult<Value> {
    let value = match request {
        Request::SessionSetup { session } => {
            store.session_setup(&session)?;
            Value::Null
        }
        Request::SessionTeardown { session } => json!(store.session_teardown(&session)),
        Request::SessionExists { session } => json!(store.session_exists(&session)),
        Request::SessionLock { session } => {
            store.session_lock(&session)?;
            Value::Null
        }
        Request::SessionUnlock { session } => {
            store.session_unlock(&session)?;
            Value::Null
        }
        Request::SessionLocked { session } => json!(store.session_locked(&session)),
        Request::SessionMarkSaved { session } => {
            store.session_mark_saved(&session)?;
            Value::Null
        }
        Request::SessionMarkUnsaved { session } => {
            store.session_mark_unsaved(&session)?;
            Value::Null
        }
        Request::SessionSaved { session } => json!(store.session_saved(&session)),
        Request::SessionChanged { session } => json!(store.session_changed(&session)),

        Request::NodeExists { session, scope, path } => json!(store.node_exists(&session, scope, &path)),
        Request::NodeIsDefault { session, scope, path } => {
            json!(store.node_is_default(&session, scope, &path))
        }
        Request::NodeGet { session, scope, path } => json!(store.node_get(&session, scope, &path)),
        Request::NodeGetType { path } => to_value(store.node_get_type(&path))?,
        Request::NodeGetComment { session, scope, path } => {
            json!(store.node_get_comment(&session, scope, &path))
        }
        Request::NodeGetStatus { session, scope, path } => {
            to_value(store.node_get_status(&session, scope, &path))?
        }
        Request::TreeGet { session, scope, path } => {
            store.tree_get(&session, scope, &path).unwrap_or(Value::Null)
        }
        Request::Show { session, scope, path } => json!(store.show(&session, scope, &path)),

        Request::Set { session, path } => {
            store.set(&session, &path)?;
            json!("")
        }
        Request::Delete { session, path } => {
            store.delete(&session, &path)?;
            json!("")
        }
        Request::Comment { session, path, comment } => {
            store.comment(&session, &path, &comment)?;
            json!("")
        }
        Request::ValidatePath { path } => {
            store.validate_path(&path)?;
            json!("")
        }
        Request::Validate { session } => {
            store.validate(&session)?;
            json!("")
        }
        Request::Discard { session } => {
            store.discard(&session)?;
            Value::Null
        }
        Request::Commit { session, comment } => json!(store.commit(&session, &comment).await?),
        Request::ConfirmedCommit {
            session,
            comment,
            timeout_secs,
        } => {
            if timeout_secs == 0 {
                return Err(ConfigdError::InvalidArgument(
                    "confirmation timeout must be at least one second".to_string(),
                ));
            }
            let timeout = Duration::from_secs(timeout_secs);
            json!(store.confirmed_commit(&session, &comment, timeout).await?)
        }
        Request::CancelCommit { session } => json!(store.cancel_commit(&session).await?),
        Request::Save => {
            store.save().await?;
            Value::Null
        }
        Request::Load { session, file } => match store.load(&session, Path::new(&file)).await {
            Ok(()) => json!(true),
            Err(ConfigdError::PersistenceFailed { path, reason }) => {
                tracing::warn!(path = %path.display(), reason = %reason, "Load failed");
                json!(false)
            }
            Err(err) => return Err(err),
        },
        Request::Merge { session, file } => {
            store.merge(&session, Path::new(&file)).await?;
            json!(true)
        }
        Request::Rename { session, from, to } => {
            store.rename(&session, &from, &to)?;
            Value::Null
        }
        Request::Copy { session, from, to } => {
            store.copy(&session, &from, &to)?;
            Value::Null
        }

        Request::TemplateGet { path } => to_value(store.template_get(&path))?,
        Request::TemplateGetChildren { path } => json!(store.template_get_children(&path)),
        Request::TemplateGetAllowed { path } => json!(store.template_get_allowed(&path)),
        Request::TemplateValidatePath { path } => json!(store.template_validate_path(&path)),
        Request::TemplateValidateValues { path } => json!(store.template_validate_values(&path)),
        Request::GetHelp {
            session,
            path,
            with_pattern,
        } => to_value(store.get_help(&session, &path, with_pattern))?,
    };
    Ok(value)
}
