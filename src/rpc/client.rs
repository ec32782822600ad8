//! HTTP client for the `/rpc` endpoint.

use rand::Rng;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::error::ErrorKind;
use crate::rpc::{Reply, Request};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message}")]
    Rpc { kind: ErrorKind, message: String },
}

impl ClientError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ClientError::Rpc { kind, .. } => Some(*kind),
            ClientError::Transport(_) => None,
        }
    }
}

/// Retry settings for calls that may hit a busy commit.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt`: doubling from `base_delay_ms`,
    /// capped at `max_delay_ms`, plus up to a tenth more at random so
    /// clients that collided spread out.
    pub fn delay(&self, attempt: u32) -> Duration {
        let Some(exponent) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };
        let ceiling = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(exponent).unwrap_or(u64::MAX))
            .min(self.max_delay_ms);
        let spread = ceiling / 10;
        let extra = if spread == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..spread)
        };
        Duration::from_millis(ceiling + extra)
    }
}

#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl RpcClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Send one request and unwrap the reply envelope.
    pub async fn call(&self, request: &Request) -> Result<Value, ClientError> {
        let reply: Reply = self
            .http
            .post(format!("{}/rpc", self.base_url))
            .json(request)
            .send()
            .await?
            .json()
            .await?;

        match reply {
            Reply::Result(value) => Ok(value),
            Reply::Error(err) => Err(ClientError::Rpc {
                kind: err.kind,
                message: err.message,
            }),
        }
    }

    /// Like [`call`](Self::call), retrying while the daemon reports `busy`.
    pub async fn call_with_retry(&self, request: &Request) -> Result<Value, ClientError> {
        let mut attempt = 0;
        loop {
            match self.call(request).await {
                Err(err) if err.kind() == Some(ErrorKind::Busy) && attempt + 1 < self.retry.max_attempts => {
                    attempt += 1;
                    let delay = self.retry.delay(attempt);
                    tracing::info!(method = request.method(), attempt, delay = ?delay, "Daemon busy, retrying");
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    pub async fn status(&self) -> Result<Value, ClientError> {
        let value = self
            .http
            .get(format!("{}/status", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(value)
    }
}
