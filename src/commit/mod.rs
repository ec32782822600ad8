//! Commit Pipeline.
//!
//! # Data Flow
//! ```text
//! running + candidate
//!     → diff (Change Records in schema pre-order)
//!     → validate every `set` (first failure aborts, nothing has run yet)
//!     → group by nearest action-declaring node, order by priority
//!     → run each action (timeout = failure), collect output blocks
//!     → caller publishes the candidate only if every action succeeded
//! ```
//!
//! # Design Decisions
//! - The pipeline never touches shared state; it answers with output or
//!   an error and the store decides what to publish
//! - Actions that already ran before a failure are not compensated. The
//!   running tree is simply left as it was
//! - Changes under no action-declaring node are applied without a command

pub mod runner;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Cause, ConfigdError, ConfigdResult, Operation, PathDiagnostic};
use crate::observability::metrics;
use crate::schema::{NodeKind, Position, Schema};
use crate::tree::{diff, ChangeOp, ChangeRecord, ConfigNode};

pub use runner::{ActionFailure, ActionRequest, ActionRunner, CommandRunner};

/// Default upper bound on a single action's run time.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Result of a pipeline run that may be published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Number of change records applied.
    pub changes: usize,
    /// Concatenated action output blocks.
    pub output: String,
}

/// Check every `set` change against the schema.
pub fn validate_changes(
    schema: &Schema,
    changes: &[ChangeRecord],
    operation: Operation,
) -> Result<(), PathDiagnostic> {
    let mut leaves: HashSet<&[String]> = HashSet::new();
    for change in changes.iter().filter(|c| c.op == ChangeOp::Set) {
        let path = change.full_path();
        let resolved = schema
            .validate_complete(&path)
            .map_err(|fault| fault.diagnostic(&path).during(operation))?;

        let single_value = resolved.position == Position::Value
            && matches!(resolved.node.kind, NodeKind::Leaf(_));
        if single_value && !leaves.insert(change.path.as_slice()) {
            let index = path.len() - 1;
            return Err(PathDiagnostic::at(&path, index, Cause::ValueConflict).during(operation));
        }
    }
    Ok(())
}

/// Group changes into action invocations in execution order.
///
/// Groups run by the declaring node's priority (lower first, default 0),
/// ties broken by where the group's first change appears.
pub fn plan(schema: &Schema, changes: &[ChangeRecord]) -> Vec<ActionRequest> {
    let mut groups: Vec<(u32, usize, ActionRequest)> = Vec::new();

    for (index, change) in changes.iter().enumerate() {
        let path = change.full_path();
        let Some(scope) = schema.action_scope(&path) else {
            continue;
        };
        let scope_path = &path[..scope.depth];
        match groups.iter_mut().find(|(_, _, g)| g.scope == scope_path) {
            Some((_, _, group)) => group.changes.push(change.clone()),
            None => groups.push((
                scope.node.priority.unwrap_or(0),
                index,
                ActionRequest {
                    scope: scope_path.to_vec(),
                    action: scope.action.to_string(),
                    changes: vec![change.clone()],
                },
            )),
        }
    }

    groups.sort_by_key(|(priority, first, _)| (*priority, *first));
    groups.into_iter().map(|(_, _, request)| request).collect()
}

fn output_block(scope: &str, output: &str) -> String {
    let mut block = format!("[{scope}]\n{output}");
    if !block.ends_with('\n') {
        block.push('\n');
    }
    block.push('\n');
    block
}

/// Validates, orders, and runs the side effects of a commit.
#[derive(Clone)]
pub struct CommitPipeline {
    runner: Arc<dyn ActionRunner>,
    action_timeout: Duration,
}

impl CommitPipeline {
    pub fn new(runner: Arc<dyn ActionRunner>, action_timeout: Duration) -> Self {
        Self {
            runner,
            action_timeout,
        }
    }

    /// Run every action needed to turn `running` into `candidate`.
    pub async fn run(
        &self,
        schema: &Schema,
        running: &ConfigNode,
        candidate: &ConfigNode,
    ) -> ConfigdResult<CommitReport> {
        let changes = diff(schema, running, candidate);
        if changes.is_empty() {
            return Ok(CommitReport::default());
        }
        validate_changes(schema, &changes, Operation::Commit)?;

        let requests = plan(schema, &changes);
        tracing::debug!(
            changes = changes.len(),
            actions = requests.len(),
            "Commit plan ready"
        );

        let mut output = String::new();
        for request in &requests {
            let scope = request.scope_display();
            let result = match tokio::time::timeout(self.action_timeout, self.runner.run(request)).await {
                Ok(result) => result,
                Err(_) => Err(ActionFailure::new(format!(
                    "{} timed out after {:?}",
                    request.action, self.action_timeout
                ))),
            };
            metrics::record_action(result.is_ok());

            match result {
                Ok(text) => {
                    tracing::info!(scope = %scope, action = %request.action, "Commit action completed");
                    if !text.is_empty() {
                        output.push_str(&output_block(&scope, &text));
                    }
                }
                Err(failure) => {
                    tracing::error!(scope = %scope, action = %request.action, output = %failure.output, "Commit action failed");
                    return Err(ConfigdError::CommitActionFailed {
                        path: scope,
                        output: failure.output,
                    });
                }
            }
        }

        Ok(CommitReport {
            changes: changes.len(),
            output,
        })
    }
}

impl std::fmt::Debug for CommitPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitPipeline")
            .field("action_timeout", &self.action_timeout)
            .finish_non_exhaustive()
    }
}
