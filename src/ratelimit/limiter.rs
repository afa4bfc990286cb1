//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, trace};

use super::clock::{Clock, SystemClock};
use super::key::{resolve_key, KeyExtractor, KeyStrategy, RequestIdentity, UNKNOWN_KEY};
use super::store::RateLimiterStore;
use super::sweeper::Sweeper;
use crate::error::{GatekeeperError, Result};

/// Message returned to rejected callers when none is configured.
pub const DEFAULT_MESSAGE: &str = "Too many requests, please try again later.";
/// Default window size (15 minutes).
const DEFAULT_WINDOW_MS: u64 = 15 * 60 * 1000;
/// Default number of admitted requests per window.
const DEFAULT_MAX: u64 = 100;

/// Construction-time settings for a [`RateLimiter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterOptions {
    /// Size of the counting window in milliseconds
    pub window_ms: u64,
    /// Admitted requests per key per window
    pub max: u64,
    /// Text returned to rejected callers
    pub message: String,
    /// How request keys are derived
    pub key_strategy: KeyStrategy,
}

impl Default for LimiterOptions {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS, DEFAULT_MAX)
    }
}

impl LimiterOptions {
    /// Options with the given window and ceiling and default message and key strategy.
    pub fn new(window_ms: u64, max: u64) -> Self {
        Self {
            window_ms,
            max,
            message: DEFAULT_MESSAGE.to_string(),
            key_strategy: KeyStrategy::default(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_key_strategy(mut self, key_strategy: KeyStrategy) -> Self {
        self.key_strategy = key_strategy;
        self
    }

    /// The window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Reject a zero window or a zero ceiling.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(GatekeeperError::InvalidConfiguration(
                "window_ms must be a positive integer".to_string(),
            ));
        }
        if self.max == 0 {
            return Err(GatekeeperError::InvalidConfiguration(
                "max must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}

/// The outcome of one [`RateLimiter::check`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub admitted: bool,
    /// The configured ceiling
    pub limit: u64,
    /// Requests still allowed in this window
    pub remaining: u64,
    /// When the window resets, in ms since the Unix epoch
    pub reset_at_ms: u64,
    /// Seconds until the window resets, set only on rejection
    pub retry_after_secs: Option<u64>,
}

impl Decision {
    /// Reset time rounded up to whole seconds since the Unix epoch.
    pub fn reset_at_secs(&self) -> u64 {
        self.reset_at_ms.div_ceil(1000)
    }
}

/// A fixed-window rate limiter with its own record store.
///
/// This struct is thread-safe and can be shared across tasks behind an `Arc`.
/// Each instance counts independently; give every protected route its own
/// limiter when routes need separate budgets.
pub struct RateLimiter {
    options: LimiterOptions,
    store: Arc<RateLimiterStore>,
    clock: Arc<dyn Clock>,
    key_extractor: Arc<dyn KeyExtractor>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl RateLimiter {
    /// Create a rate limiter on the system clock.
    pub fn new(options: LimiterOptions) -> Result<Self> {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    /// Create a rate limiter reading time from `clock`.
    pub fn with_clock(options: LimiterOptions, clock: Arc<dyn Clock>) -> Result<Self> {
        options.validate()?;

        debug!(
            window_ms = options.window_ms,
            max = options.max,
            key_strategy = %options.key_strategy,
            "Creating rate limiter"
        );

        Ok(Self {
            key_extractor: Arc::new(options.key_strategy),
            options,
            store: Arc::new(RateLimiterStore::new()),
            clock,
            sweeper: Mutex::new(None),
        })
    }

    /// Replace the configured key strategy with a custom extractor.
    pub fn with_key_extractor<E>(mut self, extractor: E) -> Self
    where
        E: KeyExtractor + 'static,
    {
        self.key_extractor = Arc::new(extractor);
        self
    }

    /// Count one request for `key` and decide whether it may proceed.
    ///
    /// Every call counts, including rejected ones, so this must be called
    /// exactly once per request. A blank key is counted as [`UNKNOWN_KEY`].
    pub fn check(&self, key: &str) -> Decision {
        let key = normalize_key(key);
        let now_ms = self.clock.now_ms();
        let limit = self.options.max;

        let hit = self.store.record_hit(key, now_ms, self.options.window_ms);
        let record = hit.record;

        if hit.new_window {
            debug!(
                key = %key,
                reset_at_ms = record.window_reset_at_ms(),
                "Opened rate limit window"
            );
        }

        trace!(
            key = %key,
            count = record.count(),
            limit = limit,
            "Checked rate limit"
        );

        if record.count() > limit {
            let retry_after_secs = record.ms_until_reset(now_ms).div_ceil(1000);
            debug!(
                key = %key,
                count = record.count(),
                limit = limit,
                retry_after_secs = retry_after_secs,
                "Rate limit exceeded"
            );
            Decision {
                admitted: false,
                limit,
                remaining: 0,
                reset_at_ms: record.window_reset_at_ms(),
                retry_after_secs: Some(retry_after_secs),
            }
        } else {
            Decision {
                admitted: true,
                limit,
                remaining: record.remaining(limit),
                reset_at_ms: record.window_reset_at_ms(),
                retry_after_secs: None,
            }
        }
    }

    /// Derive the key for `identity` and [`check`](Self::check) it.
    pub fn check_request(&self, identity: &RequestIdentity) -> Decision {
        let key = resolve_key(self.key_extractor.as_ref(), identity);
        self.check(&key)
    }

    /// Remove every expired record now. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let removed = self.store.sweep_expired(self.clock.now_ms());
        debug!(removed = removed, "Swept rate limit records");
        removed
    }

    /// Start sweeping expired records every `interval` on the current Tokio runtime.
    ///
    /// Fails outside a Tokio runtime. Calling this while a sweeper is already
    /// running restarts it with the new interval.
    pub fn start_sweeper(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(GatekeeperError::InvalidConfiguration(
                "sweep interval must be positive".to_string(),
            ));
        }
        let runtime = Handle::try_current().map_err(|e| {
            GatekeeperError::InvalidConfiguration(format!(
                "sweeper requires a Tokio runtime: {}",
                e
            ))
        })?;

        let sweeper = Sweeper::spawn(&runtime, self.store.clone(), self.clock.clone(), interval);
        info!(interval_ms = interval.as_millis() as u64, "Rate limit sweeper started");

        // Dropping a previous sweeper stops it.
        *self.sweeper.lock() = Some(sweeper);
        Ok(())
    }

    /// Whether a background sweeper is running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|sweeper| sweeper.is_running())
    }

    /// Stop the background sweeper, if any, and wait for it to exit.
    pub async fn shutdown(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.shutdown().await;
            info!("Rate limit sweeper stopped");
        }
    }

    /// Current in-window count for `key`, or `None` if it has no live window.
    ///
    /// A blank key reads the [`UNKNOWN_KEY`] bucket, as in [`check`](Self::check).
    pub fn count_for(&self, key: &str) -> Option<u64> {
        let now_ms = self.clock.now_ms();
        self.store
            .get(normalize_key(key))
            .filter(|record| !record.is_expired(now_ms))
            .map(|record| record.count())
    }

    /// Number of records currently held, including expired ones not yet swept.
    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }

    /// The options this limiter was built with.
    pub fn options(&self) -> &LimiterOptions {
        &self.options
    }

    /// The text returned to rejected callers.
    pub fn message(&self) -> &str {
        &self.options.message
    }

    /// Drop all records.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.store.clear();
    }
}

fn normalize_key(key: &str) -> &str {
    if key.trim().is_empty() {
        UNKNOWN_KEY
    } else {
        key
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("options", &self.options)
            .field("tracked_keys", &self.store.len())
            .field("sweeping", &self.is_sweeping())
            .finish()
    }
}
