//! Explicit lifecycle object for a single resource.
//!
//! A [`ScopedResource`] owns the acquisition parameters, the resource once
//! acquired, and the lifecycle state. It can be driven step by step with
//! [`enter`](ScopedResource::enter) / [`exit`](ScopedResource::exit), or in
//! one go with [`run`](ScopedResource::run), which composes acquire, body
//! and release with these guarantees:
//!
//! 1. acquire runs first; if it fails the body never runs and nothing is
//!    released;
//! 2. the body runs exactly once;
//! 3. release runs exactly once, whatever the body did;
//! 4. a body failure is returned after release completed, never swallowed;
//! 5. a release failure after a successful body fails the scope (unless the
//!    configured [`ReleaseErrorPolicy`] says to log it instead);
//! 6. when both fail, the body's error wins and the release error is attached
//!    to it.
//!
//! If the body panics, the unwinding drops the `ScopedResource`, whose
//! destructor performs the release and logs any failure.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::{ReleaseErrorPolicy, ScopeConfig};
use crate::errors::{InvalidStateError, ReleaseError, ScopeError};
use crate::monitor::{global_monitor, ScopeMonitor};
use crate::resource::{Acquire, Release};
use crate::types::{ResourceState, ScopeId};

/// Scoped use of one resource acquired from `P`.
pub struct ScopedResource<P: Acquire> {
    id: ScopeId,
    params: P,
    descriptor: String,
    state: ResourceState,
    resource: Option<P::Resource>,
    releases: u32,
    config: ScopeConfig,
    monitor: Option<Arc<ScopeMonitor>>,
}

impl<P: Acquire> ScopedResource<P> {
    /// Create an unacquired scope with the default configuration.
    pub fn new(params: P) -> Self {
        Self::with_config(params, ScopeConfig::default())
    }

    /// Create an unacquired scope with an explicit configuration.
    pub fn with_config(params: P, config: ScopeConfig) -> Self {
        let monitor = config.track_leaks.then(global_monitor);
        Self {
            id: ScopeId::new(),
            descriptor: params.descriptor(),
            params,
            state: ResourceState::Unacquired,
            resource: None,
            releases: 0,
            config,
            monitor,
        }
    }

    /// Register live scopes with `monitor` instead of the global one.
    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<ScopeMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// This scope's id.
    pub const fn id(&self) -> ScopeId {
        self.id
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> ResourceState {
        self.state
    }

    /// Descriptor of the wrapped resource.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// The acquisition parameters.
    pub const fn params(&self) -> &P {
        &self.params
    }

    /// How many times the release policy actually ran (0 or 1).
    pub const fn release_count(&self) -> u32 {
        self.releases
    }

    /// Acquire the resource and hand out a mutable borrow of it.
    ///
    /// Fails with [`ScopeError::InvalidState`] unless the scope is
    /// `Unacquired`, and with [`ScopeError::Acquisition`] when setup fails,
    /// in which case the scope stays `Unacquired`.
    pub fn enter(&mut self) -> Result<&mut P::Resource, ScopeError<Infallible>> {
        if self.state != ResourceState::Unacquired {
            return Err(InvalidStateError::new(&self.descriptor, self.state, "enter").into());
        }

        let resource = match self.params.acquire() {
            Ok(resource) => resource,
            Err(e) => {
                debug!(scope_id = %self.id, resource = %self.descriptor, error = %e, "acquisition failed");
                return Err(e.into());
            }
        };

        self.state = ResourceState::Acquired;
        if let Some(monitor) = &self.monitor {
            monitor.register(self.id, &self.descriptor);
        }
        info!(scope_id = %self.id, resource = %self.descriptor, "acquired resource");

        Ok(self.resource.insert(resource))
    }

    /// Shared access to the resource; only valid while `Acquired`.
    pub fn resource(&self) -> Result<&P::Resource, InvalidStateError> {
        self.resource
            .as_ref()
            .ok_or_else(|| InvalidStateError::new(&self.descriptor, self.state, "use"))
    }

    /// Exclusive access to the resource; only valid while `Acquired`.
    pub fn resource_mut(&mut self) -> Result<&mut P::Resource, InvalidStateError> {
        let (descriptor, state) = (&self.descriptor, self.state);
        self.resource
            .as_mut()
            .ok_or_else(|| InvalidStateError::new(descriptor.as_str(), state, "use"))
    }

    /// Release the resource.
    ///
    /// Idempotent: once the scope is `Released` (or if it was never
    /// acquired) this is a no-op returning `Ok`. After a release attempt the
    /// scope is `Released` even when the release itself failed.
    pub fn exit(&mut self) -> Result<(), ReleaseError> {
        let Some(mut resource) = self.resource.take() else {
            debug!(scope_id = %self.id, state = %self.state, "exit without held resource is a no-op");
            return Ok(());
        };

        let outcome = resource.release();
        drop(resource);

        self.releases += 1;
        self.state = ResourceState::Released;
        if let Some(monitor) = &self.monitor {
            monitor.deregister(self.id);
        }

        match &outcome {
            Ok(()) => info!(scope_id = %self.id, resource = %self.descriptor, "released resource"),
            Err(e) => warn!(scope_id = %self.id, resource = %self.descriptor, error = %e, "release failed"),
        }
        outcome
    }

    /// Acquire, run `body` with the resource, release.
    ///
    /// See the module docs for the ordering and error guarantees. Calling
    /// `run` on a scope that is not `Unacquired` fails with
    /// [`ScopeError::InvalidState`] without running `body`.
    pub fn run<T, E, F>(&mut self, body: F) -> Result<T, ScopeError<E>>
    where
        F: FnOnce(&mut P::Resource) -> Result<T, E>,
    {
        let resource = self.enter().map_err(ScopeError::<Infallible>::widen::<E>)?;
        let outcome = body(resource);
        let released = self.exit();
        self.settle(outcome, released)
    }

    /// Like [`run`](Self::run), but a body failure is logged and suppressed.
    ///
    /// This is the explicit opt-in for suppression: a failed body yields
    /// `Ok(None)`. Acquisition, state and release failures are still
    /// reported as usual.
    pub fn run_suppressing<T, E, F>(&mut self, body: F) -> Result<Option<T>, ScopeError<E>>
    where
        E: fmt::Display,
        F: FnOnce(&mut P::Resource) -> Result<T, E>,
    {
        match self.run(body) {
            Ok(value) => Ok(Some(value)),
            Err(ScopeError::Body { error, release }) => {
                warn!(scope_id = %self.id, resource = %self.descriptor, error = %error, "scope body failure suppressed");
                release.map_or(Ok(None), |release| self.settle(Ok(None), Err(release)))
            }
            Err(other) => Err(other),
        }
    }

    fn settle<T, E>(
        &self,
        outcome: Result<T, E>,
        released: Result<(), ReleaseError>,
    ) -> Result<T, ScopeError<E>> {
        settle(&self.config, self.id, &self.descriptor, outcome, released)
    }
}

/// Combine the body outcome with the release outcome.
///
/// The body's error always wins; a release failure after a successful body
/// fails the scope unless the policy says to log it.
pub(crate) fn settle<T, E>(
    config: &ScopeConfig,
    id: ScopeId,
    descriptor: &str,
    outcome: Result<T, E>,
    released: Result<(), ReleaseError>,
) -> Result<T, ScopeError<E>> {
    match (outcome, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(value), Err(release)) => match config.release_errors {
            ReleaseErrorPolicy::Propagate => Err(ScopeError::Release(release)),
            ReleaseErrorPolicy::Log => {
                error!(scope_id = %id, resource = %descriptor, error = %release, "release failure suppressed by policy");
                Ok(value)
            }
        },
        (Err(error), released) => Err(ScopeError::Body {
            error,
            release: released.err(),
        }),
    }
}

impl<P: Acquire> Drop for ScopedResource<P> {
    fn drop(&mut self) {
        if self.resource.is_some() {
            warn!(scope_id = %self.id, resource = %self.descriptor, "scope dropped while acquired, releasing");
            if let Err(e) = self.exit() {
                error!(scope_id = %self.id, resource = %self.descriptor, error = %e, "release failed during drop");
            }
        }
    }
}

impl<P> fmt::Debug for ScopedResource<P>
where
    P: Acquire + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedResource")
            .field("id", &self.id)
            .field("params", &self.params)
            .field("state", &self.state)
            .field("releases", &self.releases)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Acquire a resource from `params`, run `body` with it, release it.
pub fn with_scope<P, T, E, F>(params: P, body: F) -> Result<T, ScopeError<E>>
where
    P: Acquire,
    F: FnOnce(&mut P::Resource) -> Result<T, E>,
{
    ScopedResource::new(params).run(body)
}

/// [`with_scope`] with an explicit configuration.
pub fn with_scope_config<P, T, E, F>(
    params: P,
    config: ScopeConfig,
    body: F,
) -> Result<T, ScopeError<E>>
where
    P: Acquire,
    F: FnOnce(&mut P::Resource) -> Result<T, E>,
{
    ScopedResource::with_config(params, config).run(body)
}
