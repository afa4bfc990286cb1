//! Rate limiting logic and state management.

mod clock;
mod key;
mod limiter;
mod record;
mod store;
mod sweeper;

#[cfg(any(test, feature = "testing"))]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use key::{resolve_key, KeyExtractor, KeyStrategy, RequestIdentity, UNKNOWN_KEY};
pub use limiter::{Decision, LimiterOptions, RateLimiter, DEFAULT_MESSAGE};
pub use record::RateRecord;
pub use store::{Hit, RateLimiterStore};
pub use sweeper::Sweeper;
