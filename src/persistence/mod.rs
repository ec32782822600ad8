//! Persistence Layer: the boot-configuration file.
//!
//! # Data Flow
//! ```text
//! save: running tree → format.rs (render) → <file>.tmp → rename over <file>
//! load: <file> → parser.rs (nom) → ConfigNode → caller's candidate
//! ```
//!
//! # Design Decisions
//! - Writes go to a sibling temp file first, so a crash mid-save never
//!   leaves a truncated boot configuration
//! - The parser knows nothing about the schema; loaded content is checked
//!   by the normal commit validation

pub mod format;
pub mod parser;

use std::path::{Path, PathBuf};

use crate::error::{ConfigdError, ConfigdResult};
use crate::schema::Schema;
use crate::tree::ConfigNode;

pub use format::{render, render_at};
pub use parser::{parse_config, ParseError};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically replace `path` with the rendering of `tree`.
pub async fn save_file(schema: &Schema, tree: &ConfigNode, path: &Path) -> ConfigdResult<()> {
    let text = render(schema, tree);
    let tmp = temp_path(path);

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ConfigdError::persistence(dir, e))?;
    }
    tokio::fs::write(&tmp, text.as_bytes())
        .await
        .map_err(|e| ConfigdError::persistence(&tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(ConfigdError::persistence(path, e));
    }

    tracing::info!(path = %path.display(), bytes = text.len(), "Configuration saved");
    Ok(())
}

/// Read and parse a boot-configuration file.
pub async fn load_file(path: &Path) -> ConfigdResult<ConfigNode> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigdError::persistence(path, e))?;
    let tree = parse_config(&text).map_err(|e| ConfigdError::persistence(path, e))?;
    tracing::info!(path = %path.display(), "Configuration loaded");
    Ok(tree)
}
