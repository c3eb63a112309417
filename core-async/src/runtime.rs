//! Runtime utilities for hosts that are not async themselves.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs the provided future to completion on a fresh current-thread runtime.
///
/// Returns an error instead of panicking when the runtime cannot be built,
/// which happens on hosts that forbid spawning the IO driver.
pub fn block_on<F>(future: F) -> std::io::Result<F::Output>
where
    F: std::future::Future,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}
