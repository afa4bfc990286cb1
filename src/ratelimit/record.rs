//! Per-key counting state for a fixed window.

/// Request count for one key within its current window.
///
/// The key itself is the store's map key. A record whose reset instant has
/// been reached is stale and must be replaced, never incremented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRecord {
    /// Requests observed in the current window
    count: u64,
    /// When the current window ends, in ms since the Unix epoch
    window_reset_at_ms: u64,
}

impl RateRecord {
    /// Open a new window starting at `now_ms`.
    pub fn fresh(now_ms: u64, window_ms: u64) -> Self {
        Self {
            count: 0,
            window_reset_at_ms: now_ms.saturating_add(window_ms),
        }
    }

    /// Whether the window has lapsed. The reset instant itself counts as lapsed.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.window_reset_at_ms
    }

    /// Count one request and return the new count.
    pub fn increment(&mut self) -> u64 {
        self.count = self.count.saturating_add(1);
        self.count
    }

    /// Requests observed in the current window.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// When the current window ends, in ms since the Unix epoch.
    pub fn window_reset_at_ms(&self) -> u64 {
        self.window_reset_at_ms
    }

    /// Remaining quota against `max`, never below zero.
    pub fn remaining(&self, max: u64) -> u64 {
        max.saturating_sub(self.count)
    }

    /// Milliseconds left until the window resets.
    pub fn ms_until_reset(&self, now_ms: u64) -> u64 {
        self.window_reset_at_ms.saturating_sub(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_record_starts_empty() {
        let record = RateRecord::fresh(1_000, 500);
        assert_eq!(record.count(), 0);
        assert_eq!(record.window_reset_at_ms(), 1_500);
        assert_eq!(record.remaining(3), 3);
    }

    #[test]
    fn test_expiry_includes_reset_instant() {
        let record = RateRecord::fresh(0, 1_000);
        assert!(!record.is_expired(999));
        assert!(record.is_expired(1_000));
        assert!(record.is_expired(1_001));
    }

    #[test]
    fn test_increment_and_remaining() {
        let mut record = RateRecord::fresh(0, 1_000);
        assert_eq!(record.increment(), 1);
        assert_eq!(record.increment(), 2);
        assert_eq!(record.remaining(2), 0);

        // Past the ceiling the count keeps growing but remaining floors at zero
        assert_eq!(record.increment(), 3);
        assert_eq!(record.remaining(2), 0);
    }

    #[test]
    fn test_ms_until_reset() {
        let record = RateRecord::fresh(0, 1_000);
        assert_eq!(record.ms_until_reset(200), 800);
        assert_eq!(record.ms_until_reset(5_000), 0);
    }
}
