//! Process-wide configuration, read from the environment.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::retry::{BoundedRetries, RetryPolicy};
use crate::session::ApiCredentials;

pub const API_ID_VAR: &str = "TELEGRAM_API_ID";
pub const API_HASH_VAR: &str = "TELEGRAM_API_HASH";
pub const BIND_VAR: &str = "LAYER_GATEWAY_BIND";
pub const SESSION_DIR_VAR: &str = "LAYER_GATEWAY_SESSION_DIR";
pub const RETRIES_VAR: &str = "LAYER_GATEWAY_CONNECT_RETRIES";
pub const RETRY_DELAY_VAR: &str = "LAYER_GATEWAY_RETRY_DELAY_MS";

const DEFAULT_BIND: &str = "127.0.0.1:3000";
const DEFAULT_RETRIES: u32 = 5;
const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid { var: &'static str, value: String, reason: String },
}

/// Everything the gateway binary needs to start.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub credentials:      ApiCredentials,
    pub bind:             SocketAddr,
    /// Where session files are materialized while a connection is live.
    pub session_dir:      PathBuf,
    pub connect_attempts: NonZeroU32,
    pub retry_delay:      Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset and blank values are the same.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_id = get(API_ID_VAR).ok_or(ConfigError::Missing(API_ID_VAR))?;
        let api_id: i32 = parse(API_ID_VAR, &api_id)?;
        if api_id == 0 {
            return Err(invalid(API_ID_VAR, "0", "must be non-zero"));
        }
        let api_hash = get(API_HASH_VAR).ok_or(ConfigError::Missing(API_HASH_VAR))?;

        let bind = get(BIND_VAR).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = parse(BIND_VAR, &bind)?;

        let session_dir = get(SESSION_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("layer-gateway"));

        let connect_attempts = match get(RETRIES_VAR) {
            Some(raw) => {
                let n: u32 = parse(RETRIES_VAR, &raw)?;
                NonZeroU32::new(n).ok_or_else(|| invalid(RETRIES_VAR, &raw, "must be at least 1"))?
            }
            None => NonZeroU32::new(DEFAULT_RETRIES).unwrap_or(NonZeroU32::MIN),
        };

        let retry_delay = match get(RETRY_DELAY_VAR) {
            Some(raw) => Duration::from_millis(parse(RETRY_DELAY_VAR, &raw)?),
            None => Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        };

        Ok(Self {
            credentials: ApiCredentials::new(api_id, api_hash),
            bind,
            session_dir,
            connect_attempts,
            retry_delay,
        })
    }

    /// The connection retry policy these settings describe.
    pub fn retry_policy(&self) -> Arc<dyn RetryPolicy> {
        Arc::new(BoundedRetries::new(self.connect_attempts, self.retry_delay))
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| invalid(var, raw, &e.to_string()))
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { var, value: value.to_string(), reason: reason.to_string() }
}
