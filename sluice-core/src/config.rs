//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SluiceError};

/// Environment variable holding the expiration in milliseconds.
pub const ENV_EXPIRATION_MS: &str = "SLUICE_EXPIRATION_MS";
/// Environment variable holding the map preallocation hint.
pub const ENV_INITIAL_CAPACITY: &str = "SLUICE_INITIAL_CAPACITY";

/// TTL cache configuration.
///
/// Has no `Default`; the expiration must always come from the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live of a stored value, in milliseconds
    pub expiration_ms: u64,
    /// Preallocation hint for the value map and lock registry
    #[serde(default)]
    pub initial_capacity: usize,
}

impl CacheConfig {
    /// Creates a configuration with the given expiration.
    ///
    /// Precision is whole milliseconds; a sub-millisecond remainder rounds
    /// up, so a non-zero `expiration` never becomes zero.
    pub fn new(expiration: Duration) -> Self {
        let millis = expiration.as_nanos().div_ceil(1_000_000);
        Self {
            expiration_ms: u64::try_from(millis).unwrap_or(u64::MAX),
            initial_capacity: 0,
        }
    }

    /// Sets the preallocation hint.
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Returns the expiration as a `Duration`.
    pub fn expiration(&self) -> Duration {
        Duration::from_millis(self.expiration_ms)
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.expiration_ms == 0 {
            return Err(SluiceError::InvalidExpiration(
                "expiration must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration from the process environment.
    ///
    /// A `.env` file in the working directory is read first, if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expiration_ms = match lookup(ENV_EXPIRATION_MS) {
            Some(raw) => parse_var(ENV_EXPIRATION_MS, &raw)?,
            None => return Err(SluiceError::MissingExpiration),
        };
        let initial_capacity = match lookup(ENV_INITIAL_CAPACITY) {
            Some(raw) => parse_var(ENV_INITIAL_CAPACITY, &raw)?,
            None => 0,
        };

        let config = Self {
            expiration_ms,
            initial_capacity,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| SluiceError::EnvVar {
        name: name.into(),
        reason: e.to_string(),
    })
}
