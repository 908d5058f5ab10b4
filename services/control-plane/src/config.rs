//! Control plane configuration (env-driven).

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use keyprop_broadcast::BroadcastConfig;

use crate::transport::{RetryPolicy, TransportKind};

/// Bearer token presented to gateways. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct GatewayToken(String);

impl GatewayToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for GatewayToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GatewayToken(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,

    /// Fallback log filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// TOML file listing APIs and their gateway deployments.
    pub registry_file: PathBuf,

    pub transport: TransportKind,

    pub gateway_token: Option<GatewayToken>,

    /// Bound on one gateway delivery, retries included.
    pub delivery_timeout: Duration,

    /// Bound on a whole broadcast. `None` disables it.
    pub broadcast_deadline: Option<Duration>,

    pub retry: RetryPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr: SocketAddr = lookup("KEYPROP_LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string())
            .parse()
            .context("KEYPROP_LISTEN_ADDR must be a socket address (host:port).")?;

        let log_level = lookup("KEYPROP_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let registry_file = lookup("KEYPROP_REGISTRY_FILE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .context("Missing registry file. Set KEYPROP_REGISTRY_FILE.")?;

        let transport: TransportKind = match lookup("KEYPROP_TRANSPORT") {
            Some(v) => v.parse().context("KEYPROP_TRANSPORT is invalid.")?,
            None => TransportKind::Http,
        };

        let gateway_token = lookup("KEYPROP_GATEWAY_TOKEN")
            .filter(|v| !v.trim().is_empty())
            .map(GatewayToken::new);

        let delivery_timeout_ms: u64 = lookup("KEYPROP_DELIVERY_TIMEOUT_MS")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("KEYPROP_DELIVERY_TIMEOUT_MS must be an integer (milliseconds).")?
            .unwrap_or(10_000);
        let delivery_timeout = Duration::from_millis(delivery_timeout_ms.max(100));

        let deadline_ms: u64 = lookup("KEYPROP_BROADCAST_DEADLINE_MS")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("KEYPROP_BROADCAST_DEADLINE_MS must be an integer (milliseconds).")?
            .unwrap_or(30_000);
        let broadcast_deadline = (deadline_ms > 0).then(|| Duration::from_millis(deadline_ms));

        let max_attempts: u32 = lookup("KEYPROP_TRANSPORT_MAX_ATTEMPTS")
            .map(|v| v.parse::<u32>())
            .transpose()
            .context("KEYPROP_TRANSPORT_MAX_ATTEMPTS must be an integer.")?
            .unwrap_or(3)
            .clamp(1, 10);

        let backoff_ms: u64 = lookup("KEYPROP_TRANSPORT_BACKOFF_MS")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("KEYPROP_TRANSPORT_BACKOFF_MS must be an integer (milliseconds).")?
            .unwrap_or(200);

        let retry = RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(backoff_ms),
            ..RetryPolicy::default()
        };

        Ok(Self {
            listen_addr,
            log_level,
            registry_file,
            transport,
            gateway_token,
            delivery_timeout,
            broadcast_deadline,
            retry,
        })
    }

    /// Time bounds handed to the broadcaster.
    pub fn broadcast_config(&self) -> BroadcastConfig {
        BroadcastConfig {
            delivery_timeout: Some(self.delivery_timeout),
            deadline: self.broadcast_deadline,
        }
    }
}
