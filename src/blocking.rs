use tokio::runtime::{Handle, RuntimeFlavor};

/// Runs a blocking device handshake or teardown. On a multi-threaded runtime
/// the worker hands its other tasks off first; elsewhere `f` runs inline.
pub(crate) fn block_in_place<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}
