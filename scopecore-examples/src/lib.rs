//! Example programs using the `scopecore` scoped resource library
//!
//! Each module is a small scenario that the matching example binary runs.
//! Keeping the scenarios in a library lets the tests below exercise them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
// These are examples, so we don't need to be as pedantic
#![allow(clippy::missing_const_for_fn)]

use tracing_subscriber::EnvFilter;

/// Async connection with a body timeout and a cancelled scope.
pub mod async_connection;
/// Connection scope: the active flag before, during and after.
pub mod connection;
/// File handler: write, append and read back a file.
pub mod file_handler;
/// Temporary file that disappears when its scope ends.
pub mod temporary_file;

/// Install a `tracing` subscriber honouring `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
