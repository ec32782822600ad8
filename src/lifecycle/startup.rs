//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the schema and build the store from daemon configuration
//! - Bring running state in line with the boot configuration
//!
//! # Design Decisions
//! - Fail fast on a broken schema; nothing works without one
//! - The boot file is applied through an ordinary session and commit, so
//!   it is validated and its actions run exactly as for a client commit

use std::sync::Arc;

use crate::commit::{CommandRunner, CommitPipeline};
use crate::config::DaemonConfig;
use crate::error::ConfigdResult;
use crate::schema::{Schema, SchemaError};
use crate::store::ConfigStore;

/// Session id used to apply the boot configuration.
pub const BOOT_SESSION: &str = "configd-boot";

/// Load the schema and assemble the store with a shell action runner.
pub fn build_store(config: &DaemonConfig) -> Result<Arc<ConfigStore>, SchemaError> {
    let schema = Schema::from_file(&config.store.schema_path)?;
    tracing::info!(
        schema = %config.store.schema_path.display(),
        top_level = schema.top_level().len(),
        "Schema loaded"
    );

    let runner = Arc::new(CommandRunner::new(config.commit.shell.clone()));
    let pipeline = CommitPipeline::new(runner, config.commit.action_timeout());
    Ok(Arc::new(ConfigStore::new(
        Arc::new(schema),
        pipeline,
        config.store.boot_config_path.clone(),
    )))
}

/// Load the boot configuration and commit it.
///
/// Returns the commit output, or `None` when there is no boot file.
pub async fn restore_boot_config(store: &ConfigStore) -> ConfigdResult<Option<String>> {
    let path = store.boot_config_path().to_path_buf();
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        tracing::info!(path = %path.display(), "No boot configuration, starting empty");
        return Ok(None);
    }

    store.session_setup(BOOT_SESSION)?;
    let result = async {
        store.load(BOOT_SESSION, &path).await?;
        store.commit(BOOT_SESSION, "boot").await
    }
    .await;
    store.session_teardown(BOOT_SESSION);

    let output = result?;
    tracing::info!(path = %path.display(), "Boot configuration applied");
    Ok(Some(output))
}
