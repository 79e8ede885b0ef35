use std::future::Future;

use tokio::runtime::Handle;

/// Drives an SDK future to completion from a synchronous caller.
///
/// Must not be called from a runtime worker thread; the foreground thread and
/// the download job threads are plain OS threads.
pub fn poll_until_ready<Fut, T>(handle: &Handle, future: Fut) -> T
where
    Fut: Future<Output = T>,
{
    handle.block_on(future)
}
