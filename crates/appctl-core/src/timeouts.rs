//! Timeout and polling configuration
//!
//! Values are read once per invocation and handed to the roller and the job
//! poller at construction; nothing in the polling loops looks at the
//! environment.

use std::time::Duration;

use tracing::warn;

pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_STAGING_TIMEOUT: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(3);

/// Minutes to wait for app instances to become healthy
pub const STARTUP_TIMEOUT_ENV: &str = "APPCTL_STARTUP_TIMEOUT";
/// Minutes to wait for staging to finish
pub const STAGING_TIMEOUT_ENV: &str = "APPCTL_STAGING_TIMEOUT";
/// Seconds between two polls
pub const POLLING_INTERVAL_ENV: &str = "APPCTL_POLLING_INTERVAL";
/// Minutes to poll a job before giving up; 0 polls forever
pub const ASYNC_TIMEOUT_ENV: &str = "APPCTL_ASYNC_TIMEOUT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub startup: Duration,
    pub staging: Duration,
    pub polling_interval: Duration,
    /// `None` polls a job until it reaches a terminal state
    pub job_polling: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            startup: DEFAULT_STARTUP_TIMEOUT,
            staging: DEFAULT_STAGING_TIMEOUT,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            job_polling: None,
        }
    }
}

impl Timeouts {
    /// Read every value from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read every value through `lookup`
    ///
    /// Missing, empty or unparseable values fall back to the defaults, and
    /// so does 0 for everything but the job polling limit.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let startup = read_positive(&lookup, STARTUP_TIMEOUT_ENV)
            .map(minutes)
            .unwrap_or(defaults.startup);
        let staging = read_positive(&lookup, STAGING_TIMEOUT_ENV)
            .map(minutes)
            .unwrap_or(defaults.staging);
        let polling_interval = read_positive(&lookup, POLLING_INTERVAL_ENV)
            .map(Duration::from_secs)
            .unwrap_or(defaults.polling_interval);
        let job_polling = match read_u64(&lookup, ASYNC_TIMEOUT_ENV) {
            Some(0) | None => None,
            Some(mins) => Some(minutes(mins)),
        };

        Self {
            startup,
            staging,
            polling_interval,
            job_polling,
        }
    }

    #[must_use]
    pub const fn with_startup(mut self, startup: Duration) -> Self {
        self.startup = startup;
        self
    }

    #[must_use]
    pub const fn with_staging(mut self, staging: Duration) -> Self {
        self.staging = staging;
        self
    }

    #[must_use]
    pub const fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_job_polling(mut self, limit: Option<Duration>) -> Self {
        self.job_polling = limit;
        self
    }
}

fn minutes(mins: u64) -> Duration {
    Duration::from_secs(mins.saturating_mul(60))
}

fn read_u64<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        warn!(key, "Ignoring empty timeout value, using default");
        return None;
    }
    match trimmed.parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %trimmed, "Ignoring invalid timeout value, using default");
            None
        }
    }
}

/// Like [`read_u64`], with 0 treated as unset
fn read_positive<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match read_u64(lookup, key)? {
        0 => {
            warn!(key, "Timeout value must be at least 1, using default");
            None
        }
        value => Some(value),
    }
}
