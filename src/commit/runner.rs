//! External commit action invocation.
//!
//! # Responsibilities
//! - Define the seam between the commit pipeline and the system it changes
//! - Run schema-declared action commands through a shell
//!
//! # Design Decisions
//! - The pipeline only sees [`ActionRunner`]; tests substitute a fake
//! - The command learns what changed from its environment:
//!   `CONFIGD_PATH` holds the scope path, `CONFIGD_CHANGES` one
//!   `set ...`/`delete ...` line per change
//! - A dropped invocation kills its child, so a timeout never leaves the
//!   action running behind the pipeline's back

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

use crate::tree::ChangeRecord;

/// One action invocation for one affected schema subtree.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    /// Path of the node declaring the action.
    pub scope: Vec<String>,
    pub action: String,
    /// Changes at or below `scope`, in commit order.
    pub changes: Vec<ChangeRecord>,
}

impl ActionRequest {
    pub fn scope_display(&self) -> String {
        self.scope.join(" ")
    }

    pub fn changes_display(&self) -> String {
        self.changes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// An action reported failure; `output` is what it printed.
#[derive(Debug, Clone, Error)]
#[error("{output}")]
pub struct ActionFailure {
    pub output: String,
}

impl ActionFailure {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

/// Executes commit actions, returning their textual output.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(&self, request: &ActionRequest) -> Result<String, ActionFailure>;
}

/// Runs each action as `<shell> -c <action>`.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    shell: PathBuf,
}

impl CommandRunner {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new("/bin/sh")
    }
}

#[async_trait]
impl ActionRunner for CommandRunner {
    async fn run(&self, request: &ActionRequest) -> Result<String, ActionFailure> {
        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(&request.action)
            .env("CONFIGD_PATH", request.scope_display())
            .env("CONFIGD_CHANGES", request.changes_display())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ActionFailure::new(format!("failed to run {}: {e}", request.action)))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !text.is_empty() && !text.ends_with('\n') && !stderr.is_empty() {
            text.push('\n');
        }
        text.push_str(&stderr);
        let text = text.trim_end().to_string();

        if output.status.success() {
            Ok(text)
        } else {
            let code = output.status.code().unwrap_or(-1);
            tracing::warn!(action = %request.action, code, "Commit action exited with failure");
            if text.is_empty() {
                Err(ActionFailure::new(format!("{} exited with status {code}", request.action)))
            } else {
                Err(ActionFailure::new(text))
            }
        }
    }
}
