//! Synchronization primitives.
//!
//! Async-aware locks and channels from `tokio::sync`, plus the cooperative
//! [`CancellationToken`] used to tear down in-flight aggregation work.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{CancellationToken, Mutex};
//!
//! # async fn example() {
//! let cursor = Mutex::new(0usize);
//! *cursor.lock().await += 1;
//!
//! let token = CancellationToken::new();
//! let child = token.child_token();
//! token.cancel();
//! assert!(child.is_cancelled());
//! # }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, OwnedSemaphorePermit, RwLock,
    RwLockReadGuard, RwLockWriteGuard, Semaphore,
};

pub use tokio_util::sync::CancellationToken;
