//! scopecore Benchmarks
//!
//! This crate contains performance benchmarks for the scopecore library:
//! the cost of a sync scope, an RAII guard, an async scope, and of live-scope
//! tracking in the monitor.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]

use scopecore::ScopeConfig;

/// Scope configuration without monitor registration, to measure the bare
/// acquire/body/release path.
pub fn untracked() -> ScopeConfig {
    ScopeConfig::default().with_leak_tracking(false)
}
