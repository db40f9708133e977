//! Error types for scoped resources.
//!
//! Every failure of a scope is attributed to the phase it happened in:
//!
//! - **`AcquisitionError`**: setup failed. Nothing is held and no release runs.
//! - **Body** (the caller's own error type): the scope body failed after a
//!   successful acquisition. Release still runs before the error propagates.
//! - **`ReleaseError`**: cleanup failed. Always reported. When the body also
//!   failed, it rides along as a secondary cause instead of replacing the
//!   body's error.
//! - **`InvalidStateError`**: a scope was entered or used outside the state
//!   that allows it, e.g. re-entering a scope whose resource is `Released`.
//!
//! [`ScopeError`] is the composite returned by the `run`/`with_scope`
//! family. It is generic over the body's error type so callers get their own
//! error back untouched.
//!
//! # Example
//!
//! ```rust,ignore
//! match with_scope(params, |conn| conn.query("SELECT 1")) {
//!     Ok(rows) => use_rows(rows),
//!     Err(ScopeError::Acquisition(e)) => retry_later(e),
//!     Err(ScopeError::Body { error, release }) => {
//!         if let Some(release) = release {
//!             tracing::warn!(%release, "cleanup also failed");
//!         }
//!         return Err(error);
//!     }
//!     Err(other) => return Err(other.into()),
//! }
//! ```

use std::convert::Infallible;
use std::time::Duration;

use thiserror::Error;

use crate::types::ResourceState;

/// Boxed error used as the underlying cause of acquisition/release failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Acquiring a resource failed; nothing is held.
#[derive(Debug, Error)]
#[error("failed to acquire '{resource}': {reason}")]
pub struct AcquisitionError {
    /// Descriptor of the resource that could not be acquired.
    pub resource: String,
    /// Human readable failure reason.
    pub reason: String,
    /// The underlying error, if any.
    #[source]
    pub source: Option<BoxError>,
}

impl AcquisitionError {
    /// Create an acquisition error without an underlying cause.
    pub fn new(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Releasing a resource failed.
///
/// The resource is still considered `Released` afterwards: a failed release
/// is never retried by the scope itself.
#[derive(Debug, Error)]
#[error("failed to release '{resource}': {reason}")]
pub struct ReleaseError {
    /// Descriptor of the resource whose release failed.
    pub resource: String,
    /// Human readable failure reason.
    pub reason: String,
    /// The underlying error, if any.
    #[source]
    pub source: Option<BoxError>,
}

impl ReleaseError {
    /// Create a release error without an underlying cause.
    pub fn new(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// An operation was attempted in a state that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {operation} '{resource}': resource is {state}")]
pub struct InvalidStateError {
    /// Descriptor of the resource.
    pub resource: String,
    /// The state the resource was in.
    pub state: ResourceState,
    /// The rejected operation (`enter`, `use`, ...).
    pub operation: &'static str,
}

impl InvalidStateError {
    /// Create an invalid state error.
    pub fn new(resource: impl Into<String>, state: ResourceState, operation: &'static str) -> Self {
        Self {
            resource: resource.into(),
            state,
            operation,
        }
    }
}

/// The phase of a scope in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopePhase {
    /// Setting the resource up.
    Acquire,
    /// Running the caller's body.
    Body,
    /// Returning the resource.
    Release,
}

/// Failure of a whole acquire/use/release scope.
///
/// `E` is the error type of the scope body.
#[derive(Debug, Error)]
pub enum ScopeError<E> {
    /// Acquisition failed; the body never ran and no release was attempted.
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    /// The body failed. Release has already run; if it failed too, its error
    /// is kept in `release` as a secondary cause.
    #[error("scope body failed: {error}")]
    Body {
        /// The body's own error, propagated unchanged.
        #[source]
        error: E,
        /// A release failure that happened while unwinding the body failure.
        release: Option<ReleaseError>,
    },

    /// The body succeeded but release failed; the body's result was discarded.
    #[error(transparent)]
    Release(#[from] ReleaseError),

    /// The scope was entered or used in the wrong state.
    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),

    /// The body exceeded the configured time limit and was dropped.
    #[error("scope body for '{resource}' timed out after {after:?}")]
    Timeout {
        /// Descriptor of the scoped resource.
        resource: String,
        /// The limit that was exceeded.
        after: Duration,
        /// A release failure that happened after the body was dropped.
        release: Option<ReleaseError>,
    },

    /// The body was cancelled by the caller's cancellation signal.
    #[error("scope body for '{resource}' was cancelled")]
    Cancelled {
        /// Descriptor of the scoped resource.
        resource: String,
        /// A release failure that happened after the body was dropped.
        release: Option<ReleaseError>,
    },
}

impl<E> ScopeError<E> {
    /// The phase the primary failure happened in.
    ///
    /// Returns `None` for [`ScopeError::InvalidState`], which is a misuse of
    /// the scope rather than a failure of one of its phases.
    pub const fn phase(&self) -> Option<ScopePhase> {
        match self {
            Self::Acquisition(_) => Some(ScopePhase::Acquire),
            Self::Body { .. } | Self::Timeout { .. } | Self::Cancelled { .. } => {
                Some(ScopePhase::Body)
            }
            Self::Release(_) => Some(ScopePhase::Release),
            Self::InvalidState(_) => None,
        }
    }

    /// The release failure carried alongside a body failure, if any.
    pub const fn suppressed_release(&self) -> Option<&ReleaseError> {
        match self {
            Self::Body { release, .. }
            | Self::Timeout { release, .. }
            | Self::Cancelled { release, .. } => release.as_ref(),
            _ => None,
        }
    }

    /// The body's error, if the body is what failed.
    pub const fn body_error(&self) -> Option<&E> {
        match self {
            Self::Body { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Take the body's error out, if the body is what failed.
    pub fn into_body_error(self) -> Option<E> {
        match self {
            Self::Body { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Convert the body error type, leaving every other variant untouched.
    pub fn map_body<F, G>(self, f: G) -> ScopeError<F>
    where
        G: FnOnce(E) -> F,
    {
        match self {
            Self::Acquisition(e) => ScopeError::Acquisition(e),
            Self::Body { error, release } => ScopeError::Body {
                error: f(error),
                release,
            },
            Self::Release(e) => ScopeError::Release(e),
            Self::InvalidState(e) => ScopeError::InvalidState(e),
            Self::Timeout {
                resource,
                after,
                release,
            } => ScopeError::Timeout {
                resource,
                after,
                release,
            },
            Self::Cancelled { resource, release } => ScopeError::Cancelled { resource, release },
        }
    }
}

impl ScopeError<Infallible> {
    /// Widen an error that cannot carry a body failure into any body type.
    pub fn widen<E>(self) -> ScopeError<E> {
        self.map_body(|never| match never {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct ValueError;

    #[test]
    fn acquisition_error_display() {
        let err = AcquisitionError::new("data/example.txt", "file not found");
        insta::assert_snapshot!(err, @"failed to acquire 'data/example.txt': file not found");
    }

    #[test]
    fn release_error_keeps_source() {
        let io = std::io::Error::other("disk gone");
        let err = ReleaseError::new("temp.txt", "remove failed").with_source(io);
        insta::assert_snapshot!(err, @"failed to release 'temp.txt': remove failed");
        assert_eq!(err.source().unwrap().to_string(), "disk gone");
    }

    #[test]
    fn invalid_state_display() {
        let err = InvalidStateError::new("localhost:5432", ResourceState::Released, "enter");
        insta::assert_snapshot!(err, @"cannot enter 'localhost:5432': resource is released");
    }

    #[test]
    fn body_error_is_the_primary_source() {
        let err: ScopeError<ValueError> = ScopeError::Body {
            error: ValueError,
            release: Some(ReleaseError::new("conn", "socket reset")),
        };

        insta::assert_snapshot!(err, @"scope body failed: boom");
        assert_eq!(err.source().unwrap().to_string(), "boom");
        assert_eq!(err.phase(), Some(ScopePhase::Body));
        assert_eq!(
            err.suppressed_release().unwrap().to_string(),
            "failed to release 'conn': socket reset"
        );
        assert!(matches!(err.into_body_error(), Some(ValueError)));
    }

    #[test]
    fn transparent_variants_keep_inner_display() {
        let err: ScopeError<ValueError> = ReleaseError::new("conn", "socket reset").into();
        assert_eq!(err.to_string(), "failed to release 'conn': socket reset");
        assert_eq!(err.phase(), Some(ScopePhase::Release));
        assert!(err.suppressed_release().is_none());
        assert!(err.body_error().is_none());
    }

    #[test]
    fn widen_preserves_variant() {
        let err: ScopeError<Infallible> =
            InvalidStateError::new("conn", ResourceState::Released, "enter").into();
        let widened: ScopeError<ValueError> = err.widen();
        assert!(matches!(widened, ScopeError::InvalidState(_)));
        assert_eq!(widened.phase(), None);
    }

    #[test]
    fn timeout_display() {
        let err: ScopeError<ValueError> = ScopeError::Timeout {
            resource: "localhost:5432".to_string(),
            after: Duration::from_millis(250),
            release: None,
        };
        insta::assert_snapshot!(err, @"scope body for 'localhost:5432' timed out after 250ms");
    }
}
