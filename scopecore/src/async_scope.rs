//! Async scoped resources.
//!
//! Same ordering and error guarantees as [`ScopedResource`](crate::ScopedResource),
//! with acquire, body and release as suspension points. On top of that the
//! body can be bounded:
//!
//! - by `ScopeConfig::body_timeout`, failing with [`ScopeError::Timeout`];
//! - by a caller supplied cancellation future, failing with
//!   [`ScopeError::Cancelled`].
//!
//! In both cases the body future is dropped first and release is then
//! awaited in line, so cleanup is finished by the time the error reaches the
//! caller.
//!
//! If the future driving a scope is itself dropped while the resource is held
//! (for example by an outer `tokio::time::timeout`), there is nothing left to
//! await on. The scope's destructor then calls
//! [`AsyncRelease::release_on_drop`] synchronously and logs at `error` level.
//! No background task is spawned.
//!
//! Bodies borrow the resource for the duration of a boxed future:
//!
//! ```rust,ignore
//! let rows = with_scope_async(params, |conn| {
//!     Box::pin(async move { conn.query("SELECT 1").await })
//! })
//! .await?;
//! ```

use std::convert::Infallible;
use std::fmt;
use std::future::{self, Future};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use crate::config::{BodyTimeoutMs, ScopeConfig};
use crate::errors::{InvalidStateError, ReleaseError, ScopeError};
use crate::monitor::{global_monitor, ScopeMonitor};
use crate::resource::{AsyncAcquire, AsyncRelease};
use crate::scoped::settle;
use crate::types::{ResourceState, ScopeId};

enum BodyOutcome<T, E> {
    Finished(Result<T, E>),
    TimedOut(Duration),
    Cancelled,
}

/// Async scoped use of one resource acquired from `P`.
pub struct AsyncScopedResource<P: AsyncAcquire> {
    id: ScopeId,
    params: P,
    descriptor: String,
    state: ResourceState,
    resource: Option<P::Resource>,
    releases: u32,
    config: ScopeConfig,
    monitor: Option<Arc<ScopeMonitor>>,
}

impl<P: AsyncAcquire> AsyncScopedResource<P> {
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

    /// How many times release actually ran (0 or 1).
    pub const fn release_count(&self) -> u32 {
        self.releases
    }

    /// The configured body time limit, if any.
    pub fn body_timeout(&self) -> Option<Duration> {
        self.config.body_timeout.map(BodyTimeoutMs::as_duration)
    }

    /// Acquire the resource.
    pub async fn enter(&mut self) -> Result<&mut P::Resource, ScopeError<Infallible>> {
        if self.state != ResourceState::Unacquired {
            return Err(InvalidStateError::new(&self.descriptor, self.state, "enter").into());
        }

        let resource = match self.params.acquire().await {
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

    /// Release the resource. Idempotent.
    pub async fn exit(&mut self) -> Result<(), ReleaseError> {
        // The resource stays in place while release is awaited, so a drop of
        // this future mid-release still reaches `release_on_drop`.
        let Some(resource) = self.resource.as_mut() else {
            debug!(scope_id = %self.id, state = %self.state, "exit without held resource is a no-op");
            return Ok(());
        };
        let outcome = resource.release().await;
        self.resource = None;
        self.mark_released();

        match &outcome {
            Ok(()) => info!(scope_id = %self.id, resource = %self.descriptor, "released resource"),
            Err(e) => warn!(scope_id = %self.id, resource = %self.descriptor, error = %e, "release failed"),
        }
        outcome
    }

    /// Acquire, run `body` with the resource, release.
    ///
    /// The body is bounded by the configured `body_timeout`, if any.
    pub async fn run<T, E, F>(&mut self, body: F) -> Result<T, ScopeError<E>>
    where
        F: for<'a> FnOnce(&'a mut P::Resource) -> BoxFuture<'a, Result<T, E>>,
    {
        self.run_until(future::pending::<()>(), body).await
    }

    /// Like [`run`](Self::run), but the body is abandoned as soon as `cancel`
    /// completes.
    pub async fn run_until<T, E, F, C>(&mut self, cancel: C, body: F) -> Result<T, ScopeError<E>>
    where
        F: for<'a> FnOnce(&'a mut P::Resource) -> BoxFuture<'a, Result<T, E>>,
        C: Future<Output = ()>,
    {
        let limit = self.body_timeout();
        let resource = self.enter().await.map_err(ScopeError::<Infallible>::widen::<E>)?;
        let outcome = bounded(body(resource), limit, cancel).await;
        let released = self.exit().await;

        match outcome {
            BodyOutcome::Finished(result) => {
                settle(&self.config, self.id, &self.descriptor, result, released)
            }
            BodyOutcome::TimedOut(after) => {
                warn!(scope_id = %self.id, resource = %self.descriptor, ?after, "scope body timed out");
                Err(ScopeError::Timeout {
                    resource: self.descriptor.clone(),
                    after,
                    release: released.err(),
                })
            }
            BodyOutcome::Cancelled => {
                warn!(scope_id = %self.id, resource = %self.descriptor, "scope body cancelled");
                Err(ScopeError::Cancelled {
                    resource: self.descriptor.clone(),
                    release: released.err(),
                })
            }
        }
    }

    fn mark_released(&mut self) {
        self.releases += 1;
        self.state = ResourceState::Released;
        if let Some(monitor) = &self.monitor {
            monitor.deregister(self.id);
        }
    }
}

async fn bounded<T, E, C>(
    body: BoxFuture<'_, Result<T, E>>,
    limit: Option<Duration>,
    cancel: C,
) -> BodyOutcome<T, E>
where
    C: Future<Output = ()>,
{
    let timed = async move {
        match limit {
            Some(limit) => tokio::time::timeout(limit, body)
                .await
                .map_or(BodyOutcome::TimedOut(limit), BodyOutcome::Finished),
            None => BodyOutcome::Finished(body.await),
        }
    };

    // A body that finished in the same poll as `cancel` keeps its result.
    tokio::select! {
        biased;
        outcome = timed => outcome,
        () = cancel => BodyOutcome::Cancelled,
    }
}

impl<P: AsyncAcquire> Drop for AsyncScopedResource<P> {
    fn drop(&mut self) {
        if let Some(mut resource) = self.resource.take() {
            error!(
                scope_id = %self.id,
                resource = %self.descriptor,
                "async scope dropped while acquired, releasing synchronously"
            );
            resource.release_on_drop();
            self.mark_released();
        }
    }
}

impl<P> fmt::Debug for AsyncScopedResource<P>
where
    P: AsyncAcquire + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncScopedResource")
            .field("id", &self.id)
            .field("params", &self.params)
            .field("state", &self.state)
            .field("releases", &self.releases)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Acquire a resource from `params`, await `body` with it, release it.
pub async fn with_scope_async<P, T, E, F>(params: P, body: F) -> Result<T, ScopeError<E>>
where
    P: AsyncAcquire,
    F: for<'a> FnOnce(&'a mut P::Resource) -> BoxFuture<'a, Result<T, E>>,
{
    AsyncScopedResource::new(params).run(body).await
}

/// [`with_scope_async`] with an explicit configuration.
pub async fn with_scope_async_config<P, T, E, F>(
    params: P,
    config: ScopeConfig,
    body: F,
) -> Result<T, ScopeError<E>>
where
    P: AsyncAcquire,
    F: for<'a> FnOnce(&'a mut P::Resource) -> BoxFuture<'a, Result<T, E>>,
{
    AsyncScopedResource::with_config(params, config).run(body).await
}

/// [`with_scope_async`], abandoning the body when `cancel` completes.
pub async fn with_scope_async_until<P, T, E, F, C>(
    params: P,
    cancel: C,
    body: F,
) -> Result<T, ScopeError<E>>
where
    P: AsyncAcquire,
    F: for<'a> FnOnce(&'a mut P::Resource) -> BoxFuture<'a, Result<T, E>>,
    C: Future<Output = ()>,
{
    AsyncScopedResource::new(params).run_until(cancel, body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReleaseErrorPolicy;
    use crate::testing::{Probe, ProbeEvent, ProbeParams};
    use thiserror::Error;
    use tokio::sync::oneshot;
    use tracing_test::traced_test;

    #[derive(Debug, Error, PartialEq, Eq)]
    #[error("{0}")]
    struct ValueError(&'static str);

    fn untracked() -> ScopeConfig {
        ScopeConfig::default().with_leak_tracking(false)
    }

    fn timeout_ms(ms: u64) -> ScopeConfig {
        untracked().with_body_timeout(BodyTimeoutMs::try_new(ms).unwrap())
    }

    #[tokio::test]
    async fn runs_body_between_acquire_and_release() {
        let probe = Probe::new();
        let observer = probe.clone();

        let value = with_scope_async_config(ProbeParams::new("db", &probe), untracked(), |res| {
            Box::pin(async move {
                assert!(res.is_active());
                assert_eq!(observer.release_count("db"), 0);
                Ok::<_, ValueError>(7)
            })
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(
            probe.events_for("db"),
            vec![ProbeEvent::Acquired, ProbeEvent::Released]
        );
    }

    #[tokio::test]
    async fn body_error_propagates_after_release() {
        let probe = Probe::new();
        let err = with_scope_async_config(ProbeParams::new("db", &probe), untracked(), |_| {
            Box::pin(async { Err::<(), _>(ValueError("boom")) })
        })
        .await
        .unwrap_err();

        assert_eq!(err.into_body_error(), Some(ValueError("boom")));
        assert_eq!(probe.release_count("db"), 1);
    }

    #[tokio::test]
    async fn acquisition_failure_skips_release() {
        let probe = Probe::new();
        let err = with_scope_async_config(
            ProbeParams::new("db", &probe).failing_acquire(),
            untracked(),
            |_| Box::pin(async { Ok::<_, ValueError>(()) }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ScopeError::Acquisition(_)));
        assert_eq!(probe.release_count("db"), 0);
    }

    #[tokio::test]
    async fn release_failure_follows_policy() {
        let probe = Probe::new();
        let err = with_scope_async_config(
            ProbeParams::new("a", &probe).failing_release(),
            untracked(),
            |_| Box::pin(async { Ok::<_, ValueError>(1) }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ScopeError::Release(_)));

        let logged = untracked().with_release_errors(ReleaseErrorPolicy::Log);
        let value = with_scope_async_config(
            ProbeParams::new("b", &probe).failing_release(),
            logged,
            |_| Box::pin(async { Ok::<_, ValueError>(2) }),
        )
        .await
        .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn timeout_drops_body_then_releases() {
        let probe = Probe::new();
        let err = with_scope_async_config(ProbeParams::new("slow", &probe), timeout_ms(20), |_| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, ValueError>(())
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ScopeError::Timeout { after, release: None, .. } if after == Duration::from_millis(20)
        ));
        assert_eq!(
            probe.events_for("slow"),
            vec![ProbeEvent::Acquired, ProbeEvent::Released]
        );
    }

    #[tokio::test]
    async fn timeout_keeps_release_failure() {
        let probe = Probe::new();
        let err = with_scope_async_config(
            ProbeParams::new("slow", &probe).failing_release(),
            timeout_ms(10),
            |_| Box::pin(future::pending::<Result<(), ValueError>>()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ScopeError::Timeout { .. }));
        assert!(err.suppressed_release().is_some());
    }

    #[tokio::test]
    async fn cancellation_releases_before_returning() {
        let probe = Probe::new();
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        let mut scope = AsyncScopedResource::with_config(ProbeParams::new("job", &probe), untracked());
        let cancel = async move {
            let _ = cancel_rx.await;
        };
        let err = scope
            .run_until(cancel, move |_| {
                Box::pin(async move {
                    let _ = cancel_tx.send(());
                    future::pending::<Result<(), ValueError>>().await
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ScopeError::Cancelled { release: None, .. }));
        assert_eq!(scope.state(), ResourceState::Released);
        assert_eq!(probe.release_count("job"), 1);
    }

    #[tokio::test]
    async fn finished_body_wins_over_ready_cancellation() {
        let probe = Probe::new();

        for _ in 0..32 {
            let mut scope =
                AsyncScopedResource::with_config(ProbeParams::new("race", &probe), untracked());
            let value = scope
                .run_until(future::ready(()), |_| {
                    Box::pin(async { Ok::<_, ValueError>(7) })
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }
        assert_eq!(probe.release_count("race"), 32);
    }

    #[traced_test]
    #[tokio::test]
    async fn dropped_scope_future_releases_synchronously() {
        let probe = Probe::new();
        let params = ProbeParams::new("abandoned", &probe);

        let outer = tokio::time::timeout(
            Duration::from_millis(20),
            with_scope_async_config(params, untracked(), |_| {
                Box::pin(future::pending::<Result<(), ValueError>>())
            }),
        )
        .await;

        assert!(outer.is_err());
        assert_eq!(
            probe.events_for("abandoned"),
            vec![ProbeEvent::Acquired, ProbeEvent::ReleasedOnDrop]
        );
        assert!(logs_contain("async scope dropped while acquired"));
    }

    #[tokio::test]
    async fn dropped_during_release_still_releases() {
        let probe = Probe::new();
        let params = ProbeParams::new("stuck", &probe).with_release_delay(Duration::from_secs(5));

        let outer = tokio::time::timeout(
            Duration::from_millis(20),
            with_scope_async_config(params, untracked(), |_| {
                Box::pin(async { Ok::<_, ValueError>(()) })
            }),
        )
        .await;

        assert!(outer.is_err());
        assert_eq!(
            probe.events_for("stuck"),
            vec![ProbeEvent::Acquired, ProbeEvent::ReleasedOnDrop]
        );
    }

    #[tokio::test]
    async fn reentry_is_rejected() {
        let probe = Probe::new();
        let mut scope = AsyncScopedResource::with_config(ProbeParams::new("db", &probe), untracked());
        scope
            .run(|_| Box::pin(async { Ok::<_, ValueError>(()) }))
            .await
            .unwrap();

        let err = scope
            .run(|_| Box::pin(async { Ok::<_, ValueError>(()) }))
            .await
            .unwrap_err();
        assert!(matches!(err, ScopeError::InvalidState(_)));
        assert_eq!(scope.release_count(), 1);
        assert!(scope.resource().is_err());
    }

    #[tokio::test]
    async fn monitor_sees_scope_only_while_held() {
        let probe = Probe::new();
        let monitor = ScopeMonitor::shared();
        let mut scope = AsyncScopedResource::with_config(ProbeParams::new("db", &probe), untracked())
            .with_monitor(Arc::clone(&monitor));

        let id = scope.id();
        let seen = Arc::clone(&monitor);
        scope
            .run(move |_| {
                Box::pin(async move {
                    assert!(seen.is_active(id));
                    Ok::<_, ValueError>(())
                })
            })
            .await
            .unwrap();

        assert!(!monitor.is_active(id));
    }
}
