//! Configuration for the in-process transport.
//!
//! # Environment Variables
//!
//! | Field | Variable | Default |
//! |-------|----------|---------|
//! | `size` | `MPI_BRIDGE_NP` | `1` |
//! | `errhandler` | `MPI_BRIDGE_ERRHANDLER` (`fatal` or `return`) | `return` |
//! | `timeout` | `MPI_BRIDGE_TIMEOUT_MS` | none |

use std::env;
use std::time::Duration;

use crate::errhandler::Errhandler;

/// Number of ranks.
pub const ENV_NP: &str = "MPI_BRIDGE_NP";
/// Initial errhandler policy of every rank.
pub const ENV_ERRHANDLER: &str = "MPI_BRIDGE_ERRHANDLER";
/// Upper bound for any single blocking wait, in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "MPI_BRIDGE_TIMEOUT_MS";

/// Settings for a [`Universe`](super::Universe).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    /// Number of ranks
    pub size: usize,
    /// Errhandler policy every rank starts with
    pub errhandler: Errhandler,
    /// Upper bound for any single blocking wait. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        LocalConfig::new(1)
    }
}

impl LocalConfig {
    /// `size` ranks, [`Errhandler::ErrorsReturn`], no timeout.
    pub fn new(size: usize) -> Self {
        LocalConfig {
            size,
            errhandler: Errhandler::default(),
            timeout: None,
        }
    }

    /// Start every rank with `errhandler`.
    pub fn with_errhandler(mut self, errhandler: Errhandler) -> Self {
        self.errhandler = errhandler;
        self
    }

    /// Give up on blocking waits after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the configuration through `lookup`. Missing or unparsable values
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LocalConfig::default();
        if let Some(size) = lookup(ENV_NP)
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
        {
            config.size = size;
        }
        match lookup(ENV_ERRHANDLER).as_deref().map(str::trim) {
            Some("fatal") => config.errhandler = Errhandler::Fatal,
            Some("return") => config.errhandler = Errhandler::ErrorsReturn,
            Some(other) => tracing::warn!(value = other, "ignoring unknown {ENV_ERRHANDLER}"),
            None => {}
        }
        if let Some(ms) = lookup(ENV_TIMEOUT_MS).and_then(|s| s.trim().parse::<u64>().ok()) {
            config.timeout = Some(Duration::from_millis(ms));
        }
        config
    }
}
