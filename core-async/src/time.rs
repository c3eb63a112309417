//! Time-related abstractions.
//!
//! Re-exports `tokio::time` so adapter timeouts and retry backoff integrate with
//! the runtime's timer wheel (and with paused time in tests).
//!
//! ```rust
//! use core_async::time::{timeout, sleep, Duration};
//!
//! # async fn example() {
//! let slow = timeout(Duration::from_millis(10), sleep(Duration::from_secs(1))).await;
//! assert!(slow.is_err());
//! # }
//! ```

pub use tokio::time::{error::Elapsed, interval, sleep, timeout, Interval, Sleep, Timeout};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
