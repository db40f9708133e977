//! Testing utilities for scoped resources.
//!
//! - [`probe`]: a resource that records every lifecycle step it goes through,
//!   with switches to make acquisition or release fail
//! - [`generators`]: `proptest` strategies over failure scenarios (feature
//!   `testing`)
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use scopecore::testing::prelude::*;
//!
//! let probe = Probe::new();
//! let err = with_scope(ProbeParams::new("db", &probe).failing_release(), |_| Ok::<_, MyError>(()))
//!     .unwrap_err();
//! assert_eq!(probe.release_count("db"), 1);
//! ```

#[cfg(feature = "testing")]
pub mod generators;
pub mod probe;

pub use probe::{Probe, ProbeEvent, ProbeParams, ProbeRecord, ProbeResource};

/// Prelude module for convenient imports.
pub mod prelude {
    #[cfg(feature = "testing")]
    pub use super::generators::*;
    pub use super::probe::{Probe, ProbeEvent, ProbeParams, ProbeRecord, ProbeResource};
}
