//! Inline scoped blocks via an RAII guard.
//!
//! `scope(params)` acquires immediately and returns a [`Guard`] that derefs to
//! the resource. The resource is released when the guard goes out of scope,
//! including while unwinding from a panic. Because `Drop` cannot return an
//! error, a failed release on that path is logged at `error` level; call
//! [`Guard::close`] to observe the failure instead.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::ScopeConfig;
use crate::errors::{AcquisitionError, ReleaseError};
use crate::monitor::{global_monitor, ScopeMonitor};
use crate::resource::{Acquire, Release};
use crate::types::ScopeId;

/// Holds an acquired resource until closed or dropped.
pub struct Guard<R: Release> {
    id: ScopeId,
    descriptor: String,
    resource: Option<R>,
    monitor: Option<Arc<ScopeMonitor>>,
}

impl<R: Release> Guard<R> {
    /// Acquire a resource from `params` with the default configuration.
    pub fn acquire<P>(params: &P) -> Result<Self, AcquisitionError>
    where
        P: Acquire<Resource = R>,
    {
        Self::acquire_with_config(params, &ScopeConfig::default())
    }

    /// Acquire a resource from `params`; `config.track_leaks` decides whether
    /// the guard shows up in the global monitor.
    pub fn acquire_with_config<P>(params: &P, config: &ScopeConfig) -> Result<Self, AcquisitionError>
    where
        P: Acquire<Resource = R>,
    {
        let monitor = config.track_leaks.then(global_monitor);
        Self::acquire_into(params, monitor)
    }

    /// Acquire a resource and register it with `monitor`.
    pub fn acquire_monitored<P>(
        params: &P,
        monitor: Arc<ScopeMonitor>,
    ) -> Result<Self, AcquisitionError>
    where
        P: Acquire<Resource = R>,
    {
        Self::acquire_into(params, Some(monitor))
    }

    fn acquire_into<P>(
        params: &P,
        monitor: Option<Arc<ScopeMonitor>>,
    ) -> Result<Self, AcquisitionError>
    where
        P: Acquire<Resource = R>,
    {
        let id = ScopeId::new();
        let descriptor = params.descriptor();
        let resource = params.acquire()?;

        if let Some(monitor) = &monitor {
            monitor.register(id, &descriptor);
        }
        info!(scope_id = %id, resource = %descriptor, "acquired resource");

        Ok(Self {
            id,
            descriptor,
            resource: Some(resource),
            monitor,
        })
    }

    /// This guard's scope id.
    pub const fn id(&self) -> ScopeId {
        self.id
    }

    /// Descriptor of the held resource.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Release now and report the outcome.
    pub fn close(mut self) -> Result<(), ReleaseError> {
        self.release_held()
    }

    fn release_held(&mut self) -> Result<(), ReleaseError> {
        let Some(mut resource) = self.resource.take() else {
            return Ok(());
        };
        let outcome = resource.release();
        drop(resource);

        if let Some(monitor) = &self.monitor {
            monitor.deregister(self.id);
        }
        if outcome.is_ok() {
            info!(scope_id = %self.id, resource = %self.descriptor, "released resource");
        }
        outcome
    }

    // Only `close` and `drop` empty the slot, and both consume the guard.
    fn held(&self) -> &R {
        self.resource
            .as_ref()
            .unwrap_or_else(|| unreachable!("guard resource accessed after release"))
    }

    fn held_mut(&mut self) -> &mut R {
        self.resource
            .as_mut()
            .unwrap_or_else(|| unreachable!("guard resource accessed after release"))
    }
}

impl<R: Release> Deref for Guard<R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.held()
    }
}

impl<R: Release> DerefMut for Guard<R> {
    fn deref_mut(&mut self) -> &mut R {
        self.held_mut()
    }
}

impl<R: Release> Drop for Guard<R> {
    fn drop(&mut self) {
        if self.resource.is_none() {
            return;
        }
        debug!(scope_id = %self.id, resource = %self.descriptor, "guard dropped, releasing");
        if let Err(e) = self.release_held() {
            error!(scope_id = %self.id, resource = %self.descriptor, error = %e, "release failed during drop");
        }
    }
}

impl<R> fmt::Debug for Guard<R>
where
    R: Release + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

/// Acquire a resource for the rest of the enclosing block.
///
/// ```rust,ignore
/// let mut conn = scope(&ConnectionParams::new("localhost", 5432))?;
/// assert!(conn.is_active());
/// // released here
/// ```
pub fn scope<P: Acquire>(params: &P) -> Result<Guard<P::Resource>, AcquisitionError> {
    Guard::acquire(params)
}
