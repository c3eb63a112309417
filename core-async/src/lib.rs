//! Async runtime facade for the music federation core.
//!
//! Every core crate goes through this crate instead of naming tokio directly,
//! so the executor surface the core relies on stays small and auditable.
//!
//! # Modules
//!
//! - `task`: Task spawning
//! - `pool`: Bounded [`WorkerPool`](pool::WorkerPool) with shutdown semantics
//! - `time`: Sleep, timeout, durations
//! - `sync`: Async-aware locks, channels and [`CancellationToken`](sync::CancellationToken)
//! - `runtime`: Blocking entry points for synchronous hosts
//!
//! # Examples
//!
//! ```rust
//! use core_async::pool::WorkerPool;
//! use core_async::time::{sleep, Duration};
//!
//! # async fn example() {
//! let pool = WorkerPool::new("aggregation", 3);
//! let handle = pool
//!     .spawn(async {
//!         sleep(Duration::from_millis(5)).await;
//!         42
//!     })
//!     .expect("pool accepts work before shutdown");
//!
//! assert_eq!(handle.await.unwrap(), Some(42));
//! # }
//! ```

pub mod pool;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use pool::{PoolError, WorkerPool};
pub use task::spawn;
pub use time::{sleep, Duration, Instant};
