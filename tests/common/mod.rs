//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use configd::commit::{ActionFailure, ActionRequest, ActionRunner, CommitPipeline};
use configd::rpc::{self, AppState};
use configd::{ConfigStore, Schema};

pub const SAMPLE_SCHEMA: &str = include_str!("../../schema/system.toml");

pub const NTP_RESTART: &str = "Stopping NTP server: ntpd.\nStarting NTP server: ntpd.\n";

pub fn p(segs: &[&str]) -> Vec<String> {
    segs.iter().map(|s| s.to_string()).collect()
}

pub fn sample_schema() -> Arc<Schema> {
    Arc::new(Schema::from_toml_str(SAMPLE_SCHEMA).unwrap())
}

/// Action runner that records each invocation instead of spawning a shell.
#[derive(Default)]
pub struct FakeRunner {
    seen: Mutex<Vec<String>>,
    fail_on: Option<String>,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl FakeRunner {
    pub fn failing_on(scope: &str) -> Self {
        Self {
            fail_on: Some(scope.to_string()),
            ..Self::default()
        }
    }

    /// Each run signals `started`, then waits for `release`.
    pub fn gated(started: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            gate: Some((started, release)),
            ..Self::default()
        }
    }

    /// Scopes of the actions run so far, in order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionRunner for FakeRunner {
    async fn run(&self, request: &ActionRequest) -> Result<String, ActionFailure> {
        let scope = request.scope_display();
        self.seen.lock().unwrap().push(scope.clone());

        if let Some((started, release)) = &self.gate {
            started.notify_one();
            release.notified().await;
        }
        if self.fail_on.as_deref() == Some(scope.as_str()) {
            return Err(ActionFailure::new(format!("{scope}: action failed")));
        }
        if scope == "system ntp" {
            return Ok(NTP_RESTART.to_string());
        }
        Ok(String::new())
    }
}

pub fn store_with(runner: Arc<FakeRunner>, boot: &Path) -> Arc<ConfigStore> {
    store_with_timeout(runner, boot, Duration::from_secs(5))
}

pub fn store_with_timeout(runner: Arc<FakeRunner>, boot: &Path, timeout: Duration) -> Arc<ConfigStore> {
    let pipeline = CommitPipeline::new(runner, timeout);
    Arc::new(ConfigStore::new(sample_schema(), pipeline, boot))
}

pub fn store() -> Arc<ConfigStore> {
    store_with(Arc::new(FakeRunner::default()), Path::new("/nonexistent/config.boot"))
}

pub fn router(store: Arc<ConfigStore>) -> axum::Router {
    rpc::router(AppState::new(store), 1024 * 1024)
}
