use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Collection endpoint used when neither the build nor the embedding page
/// supplies one.
pub const DEFAULT_ENDPOINT: &str = "/cdn/pixel.gif";

/// Endpoint baked in at build time (`PAGEPULSE_ENDPOINT=... cargo build`).
pub fn build_endpoint() -> &'static str {
    option_env!("PAGEPULSE_ENDPOINT").unwrap_or(DEFAULT_ENDPOINT)
}

/// Tunables for one agent instance. Every field has a default, so a partial
/// JSON/JS object deserializes cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentConfig {
    /// Path or URL the payloads are posted to.
    pub endpoint: String,

    /// Cadence of the interaction flush.
    pub flush_interval_ms: u64,

    /// Minimum wall-clock gap between two recorded pointer samples.
    pub pointer_throttle_ms: u64,

    /// Ring bounds for the position-based buffers.
    pub pointer_capacity: usize,
    pub click_capacity: usize,

    /// Hard ceiling on the ICE negotiation used by the network-leak probe.
    pub leak_ceiling_ms: u64,

    /// Delay after page-ready at which a pending leak probe triggers a
    /// second init payload.
    pub init_fallback_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: build_endpoint().to_string(),
            flush_interval_ms: 15_000,
            pointer_throttle_ms: 500,
            pointer_capacity: 100,
            click_capacity: 50,
            leak_ceiling_ms: 3_000,
            init_fallback_ms: 3_500,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            bail!("endpoint must not be empty");
        }
        if self.flush_interval_ms == 0 {
            bail!("flush_interval_ms must be greater than zero");
        }
        if self.pointer_capacity == 0 {
            bail!("pointer_capacity must be greater than zero");
        }
        if self.click_capacity == 0 {
            bail!("click_capacity must be greater than zero");
        }
        if self.leak_ceiling_ms == 0 {
            bail!("leak_ceiling_ms must be greater than zero");
        }
        if self.init_fallback_ms < self.leak_ceiling_ms {
            bail!(
                "init_fallback_ms ({}) must not be shorter than leak_ceiling_ms ({})",
                self.init_fallback_ms,
                self.leak_ceiling_ms
            );
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn leak_ceiling(&self) -> Duration {
        Duration::from_millis(self.leak_ceiling_ms)
    }

    pub fn init_fallback(&self) -> Duration {
        Duration::from_millis(self.init_fallback_ms)
    }

    /// Defaults overridden by `PAGEPULSE_*` environment variables. Used by the
    /// native driver; the browser build takes its overrides from `start()`.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(endpoint) = lookup("PAGEPULSE_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(ms) = parse_var(&lookup, "PAGEPULSE_FLUSH_INTERVAL_MS")? {
            config.flush_interval_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, "PAGEPULSE_POINTER_THROTTLE_MS")? {
            config.pointer_throttle_ms = ms;
        }
        if let Some(capacity) = parse_var(&lookup, "PAGEPULSE_POINTER_CAPACITY")? {
            config.pointer_capacity = capacity;
        }
        if let Some(capacity) = parse_var(&lookup, "PAGEPULSE_CLICK_CAPACITY")? {
            config.click_capacity = capacity;
        }
        if let Some(ms) = parse_var(&lookup, "PAGEPULSE_LEAK_CEILING_MS")? {
            config.leak_ceiling_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, "PAGEPULSE_INIT_FALLBACK_MS")? {
            config.init_fallback_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<N: FromStr>(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<N>>
where
    N::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<N>()
            .map(Some)
            .with_context(|| format!("{key} must be an integer, got {raw:?}")),
        None => Ok(None),
    }
}
