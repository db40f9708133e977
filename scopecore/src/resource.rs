//! Acquisition and release policies.
//!
//! The acquisition policy lives on the *parameters* of a resource: a
//! `ConnectionParams { host, port }` knows how to open a `Connection`. The
//! release policy lives on the *resource*: a `Connection` knows how to close
//! itself. A scope owns both halves and guarantees the order
//! acquire, use, release.
//!
//! # Release contract
//!
//! Implementations of [`Release::release`] and [`AsyncRelease::release`]
//! must be idempotent (a second call is a no-op that returns `Ok`) and must
//! cope with partially initialised resources, e.g. a connection whose
//! handshake never completed. A partial state is not a reason to report an
//! unrelated error that would hide the real failure.

use async_trait::async_trait;

use crate::errors::{AcquisitionError, ReleaseError};

/// How to obtain a resource from a set of parameters.
pub trait Acquire {
    /// The resource produced on success.
    type Resource: Release;

    /// Identifying descriptor of the resource, e.g. a path or `host:port`.
    fn descriptor(&self) -> String;

    /// Perform the side-effecting setup.
    ///
    /// On failure nothing may be left held: no release will run.
    fn acquire(&self) -> Result<Self::Resource, AcquisitionError>;
}

/// How to return a resource to its environment.
pub trait Release {
    /// Release the resource. Must be idempotent.
    fn release(&mut self) -> Result<(), ReleaseError>;
}

/// Async counterpart of [`Acquire`]; acquisition is a suspension point.
#[async_trait]
pub trait AsyncAcquire: Send + Sync {
    /// The resource produced on success.
    type Resource: AsyncRelease;

    /// Identifying descriptor of the resource.
    fn descriptor(&self) -> String;

    /// Perform the side-effecting setup.
    async fn acquire(&self) -> Result<Self::Resource, AcquisitionError>;
}

/// Async counterpart of [`Release`]; release is a suspension point.
#[async_trait]
pub trait AsyncRelease: Send {
    /// Release the resource. Must be idempotent.
    async fn release(&mut self) -> Result<(), ReleaseError>;

    /// Synchronous last-resort release.
    ///
    /// Called from `Drop` when the future driving a scope is dropped while
    /// the resource is still held, where awaiting is impossible. Must not
    /// block on I/O for long and must leave the resource released.
    fn release_on_drop(&mut self);
}
