//! A recording test resource.
//!
//! A [`Probe`] is a shared log. Every [`ProbeResource`] acquired through
//! [`ProbeParams`] writes its lifecycle steps there, so a test can inspect
//! ordering and counts after the scope is gone.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::{AcquisitionError, ReleaseError};
use crate::resource::{Acquire, AsyncAcquire, AsyncRelease, Release};

/// One lifecycle step observed by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeEvent {
    /// Acquisition succeeded.
    Acquired,
    /// Release ran and succeeded.
    Released,
    /// Release ran and reported a failure.
    ReleaseFailed,
    /// The synchronous drop-path release of an async resource ran.
    ReleasedOnDrop,
}

/// A lifecycle step tagged with the resource name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRecord {
    /// Name given to [`ProbeParams::new`].
    pub name: String,
    /// What happened.
    pub event: ProbeEvent,
}

#[derive(Debug, Default)]
struct ProbeLog {
    records: Vec<ProbeRecord>,
    active: HashMap<String, bool>,
}

/// Shared recorder of lifecycle events. Cloning shares the log.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    log: Arc<Mutex<ProbeLog>>,
}

impl Probe {
    /// Create an empty probe.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record, in the order it happened.
    pub fn records(&self) -> Vec<ProbeRecord> {
        self.log.lock().records.clone()
    }

    /// The events of one resource, in order.
    pub fn events_for(&self, name: &str) -> Vec<ProbeEvent> {
        self.log
            .lock()
            .records
            .iter()
            .filter(|r| r.name == name)
            .map(|r| r.event)
            .collect()
    }

    /// Successful acquisitions of `name`.
    pub fn acquire_count(&self, name: &str) -> usize {
        self.count(name, |e| e == ProbeEvent::Acquired)
    }

    /// Release attempts on `name`, failed ones included.
    pub fn release_count(&self, name: &str) -> usize {
        self.count(name, |e| {
            matches!(
                e,
                ProbeEvent::Released | ProbeEvent::ReleaseFailed | ProbeEvent::ReleasedOnDrop
            )
        })
    }

    /// Whether `name` currently has its active flag set.
    pub fn is_active(&self, name: &str) -> bool {
        self.log.lock().active.get(name).copied().unwrap_or(false)
    }

    fn count(&self, name: &str, pred: impl Fn(ProbeEvent) -> bool) -> usize {
        self.log
            .lock()
            .records
            .iter()
            .filter(|r| r.name == name && pred(r.event))
            .count()
    }

    fn record(&self, name: &str, event: ProbeEvent) {
        self.log.lock().records.push(ProbeRecord {
            name: name.to_string(),
            event,
        });
    }

    fn set_active(&self, name: &str, active: bool) {
        self.log.lock().active.insert(name.to_string(), active);
    }
}

/// Parameters for acquiring a [`ProbeResource`].
#[derive(Debug, Clone)]
pub struct ProbeParams {
    name: String,
    probe: Probe,
    fail_acquire: bool,
    fail_release: bool,
    partial: bool,
    acquire_delay: Option<Duration>,
    release_delay: Option<Duration>,
}

impl ProbeParams {
    /// Parameters for a resource called `name` that reports to `probe`.
    pub fn new(name: impl Into<String>, probe: &Probe) -> Self {
        Self {
            name: name.into(),
            probe: probe.clone(),
            fail_acquire: false,
            fail_release: false,
            partial: false,
            acquire_delay: None,
            release_delay: None,
        }
    }

    /// Make acquisition fail.
    #[must_use]
    pub const fn failing_acquire(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    /// Make release fail (after it has done its work).
    #[must_use]
    pub const fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    /// Acquire without setting the active flag, like a connection whose
    /// handshake never completed.
    #[must_use]
    pub const fn partial(mut self) -> Self {
        self.partial = true;
        self
    }

    /// Sleep before acquiring (async only).
    #[must_use]
    pub const fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = Some(delay);
        self
    }

    /// Sleep before releasing (async only).
    #[must_use]
    pub const fn with_release_delay(mut self, delay: Duration) -> Self {
        self.release_delay = Some(delay);
        self
    }

    /// The resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn try_acquire(&self) -> Result<ProbeResource, AcquisitionError> {
        if self.fail_acquire {
            return Err(AcquisitionError::new(
                self.descriptor_string(),
                "probe configured to fail acquisition",
            ));
        }

        self.probe.record(&self.name, ProbeEvent::Acquired);
        self.probe.set_active(&self.name, !self.partial);

        Ok(ProbeResource {
            name: self.name.clone(),
            descriptor: self.descriptor_string(),
            probe: self.probe.clone(),
            fail_release: self.fail_release,
            release_delay: self.release_delay,
            released: false,
        })
    }

    fn descriptor_string(&self) -> String {
        format!("probe://{}", self.name)
    }
}

/// A resource that records its lifecycle in a [`Probe`].
#[derive(Debug)]
pub struct ProbeResource {
    name: String,
    descriptor: String,
    probe: Probe,
    fail_release: bool,
    release_delay: Option<Duration>,
    released: bool,
}

impl ProbeResource {
    /// The resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the active flag, e.g. to finish a partial acquisition.
    pub fn activate(&mut self) {
        self.probe.set_active(&self.name, true);
    }

    /// Whether the active flag is set.
    pub fn is_active(&self) -> bool {
        !self.released && self.probe.is_active(&self.name)
    }

    fn finish_release(&mut self) -> Result<(), ReleaseError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.probe.set_active(&self.name, false);

        if self.fail_release {
            self.probe.record(&self.name, ProbeEvent::ReleaseFailed);
            return Err(ReleaseError::new(
                self.descriptor.as_str(),
                "probe configured to fail release",
            ));
        }
        self.probe.record(&self.name, ProbeEvent::Released);
        Ok(())
    }
}

impl Acquire for ProbeParams {
    type Resource = ProbeResource;

    fn descriptor(&self) -> String {
        self.descriptor_string()
    }

    fn acquire(&self) -> Result<ProbeResource, AcquisitionError> {
        self.try_acquire()
    }
}

impl Release for ProbeResource {
    fn release(&mut self) -> Result<(), ReleaseError> {
        self.finish_release()
    }
}

#[async_trait]
impl AsyncAcquire for ProbeParams {
    type Resource = ProbeResource;

    fn descriptor(&self) -> String {
        self.descriptor_string()
    }

    async fn acquire(&self) -> Result<ProbeResource, AcquisitionError> {
        if let Some(delay) = self.acquire_delay {
            tokio::time::sleep(delay).await;
        }
        self.try_acquire()
    }
}

#[async_trait]
impl AsyncRelease for ProbeResource {
    async fn release(&mut self) -> Result<(), ReleaseError> {
        if self.released {
            return Ok(());
        }
        if let Some(delay) = self.release_delay {
            tokio::time::sleep(delay).await;
        }
        self.finish_release()
    }

    fn release_on_drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.probe.set_active(&self.name, false);
        self.probe.record(&self.name, ProbeEvent::ReleasedOnDrop);
    }
}
