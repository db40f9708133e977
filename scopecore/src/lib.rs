//! `scopecore` - scoped resource acquisition with guaranteed release
//!
//! A resource is acquired, used by a body, and released exactly once on every
//! exit path. Failures are attributed to the phase they happened in
//! (acquisition, body, release) and a release failure never hides the body's
//! own error.
//!
//! Three ways to use it:
//!
//! - [`with_scope`] / [`ScopedResource`]: a higher-order scope or an explicit
//!   lifecycle object with `enter`/`exit`/`run`;
//! - [`scope`] / [`Guard`]: an RAII guard for the rest of a block;
//! - [`with_scope_async`] / [`AsyncScopedResource`]: the async variant, with
//!   body timeouts and cancellation.
//!
//! ```rust,ignore
//! use scopecore::prelude::*;
//!
//! let status = with_scope(ConnectionParams::new("localhost", 5432), |conn| {
//!     assert!(conn.is_active());
//!     Ok::<_, std::io::Error>(conn.status())
//! })?;
//! assert!(!status.is_active());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod async_scope;
pub mod config;
pub mod errors;
pub mod guard;
pub mod monitor;
pub mod resource;
pub mod resources;
pub mod scoped;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use async_scope::{
    with_scope_async, with_scope_async_config, with_scope_async_until, AsyncScopedResource,
};
pub use config::{BodyTimeoutMs, ConfigError, ReleaseErrorPolicy, ScopeConfig};
pub use errors::{
    AcquisitionError, BoxError, InvalidStateError, ReleaseError, ScopeError, ScopePhase,
};
pub use guard::{scope, Guard};
pub use monitor::{global_monitor, ActiveScope, ScopeMonitor, ScopeStats};
pub use resource::{Acquire, AsyncAcquire, AsyncRelease, Release};
pub use scoped::{with_scope, with_scope_config, ScopedResource};
pub use types::{ResourceState, ScopeId};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::resources::{
        Connection, ConnectionParams, FileHandle, FileParams, OpenMode, TempFile, TempFileParams,
    };
    pub use crate::{
        scope, with_scope, with_scope_async, with_scope_async_config, with_scope_async_until,
        with_scope_config, Acquire, AsyncAcquire, AsyncRelease, AsyncScopedResource, Guard,
        Release, ResourceState, ScopeConfig, ScopeError, ScopedResource,
    };
}
