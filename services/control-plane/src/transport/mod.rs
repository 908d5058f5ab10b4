//! Gateway transports.
//!
//! One [`Transport`] implementation per kind, picked once at startup from
//! [`TransportKind`]:
//! - `http`: POSTs envelopes to each gateway's internal events endpoint
//! - `dry-run`: logs deliveries and reports success (local development)

mod dry_run;
mod http;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use keyprop_broadcast::Transport;

pub use dry_run::DryRunTransport;
pub use http::{HttpTransport, EVENTS_PATH};

use crate::config::GatewayToken;

/// Which transport the service delivers through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Http,
    DryRun,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Http => "http",
            TransportKind::DryRun => "dry-run",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(TransportKind::Http),
            "dry-run" | "dry_run" | "dryrun" => Ok(TransportKind::DryRun),
            other => anyhow::bail!("unknown transport '{other}' (expected 'http' or 'dry-run')"),
        }
    }
}

/// Bounded retries inside a single delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per delivery, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub initial_backoff: Duration,

    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the given failed attempt (0-based): doubles each time, capped.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(16));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Build the configured transport.
pub fn build_transport(
    kind: TransportKind,
    token: Option<&GatewayToken>,
    retry: RetryPolicy,
) -> Result<Arc<dyn Transport>> {
    let transport: Arc<dyn Transport> = match kind {
        TransportKind::Http => Arc::new(HttpTransport::new(token, retry)?),
        TransportKind::DryRun => Arc::new(DryRunTransport::new()),
    };
    Ok(transport)
}
