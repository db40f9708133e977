//! Live scope monitoring and leak detection.
//!
//! Every scope created with `track_leaks` enabled registers itself here when
//! its resource is acquired and deregisters when the resource is released.
//! Whatever is still listed is either in use right now or leaked.
//!
//! # Process-wide instance
//!
//! [`global_monitor`] returns a shared monitor that is created lazily on first
//! use and lives until the process exits. There is no explicit teardown:
//! entries disappear as their scopes release. Tests that count entries should
//! build their own [`ScopeMonitor`] and hand it to the scope instead of
//! reading the shared one, which other tests may be using concurrently.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::types::ScopeId;

/// Registry of scopes whose resource is currently acquired.
#[derive(Debug, Default)]
pub struct ScopeMonitor {
    active_scopes: Mutex<HashMap<ScopeId, ScopeInfo>>,
}

#[derive(Debug, Clone)]
struct ScopeInfo {
    resource: String,
    acquired_at: Instant,
    acquired_at_utc: DateTime<Utc>,
}

/// Snapshot of one live scope.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveScope {
    /// The scope's id.
    pub id: ScopeId,
    /// Descriptor of the held resource.
    pub resource: String,
    /// Wall-clock time the resource was acquired.
    pub acquired_at: DateTime<Utc>,
    /// How long the resource has been held.
    pub age: Duration,
}

/// Aggregate view of live scopes.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScopeStats {
    /// Number of scopes currently holding a resource.
    pub active: usize,
    /// Live scope count per resource descriptor.
    pub by_resource: HashMap<String, usize>,
    /// Age of the longest-held resource.
    pub oldest_age: Duration,
}

impl ScopeMonitor {
    /// Create an empty monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty monitor behind an `Arc`, ready to hand to scopes.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Record that `id` acquired `resource`.
    pub fn register(&self, id: ScopeId, resource: &str) {
        self.active_scopes.lock().insert(
            id,
            ScopeInfo {
                resource: resource.to_string(),
                acquired_at: Instant::now(),
                acquired_at_utc: Utc::now(),
            },
        );
    }

    /// Record that `id` released its resource. Unknown ids are ignored.
    pub fn deregister(&self, id: ScopeId) {
        self.active_scopes.lock().remove(&id);
    }

    /// Whether `id` is currently registered.
    pub fn is_active(&self, id: ScopeId) -> bool {
        self.active_scopes.lock().contains_key(&id)
    }

    /// Statistics about live scopes.
    pub fn stats(&self) -> ScopeStats {
        let scopes = self.active_scopes.lock();
        let mut by_resource = HashMap::new();
        let mut oldest_age = Duration::ZERO;

        for info in scopes.values() {
            *by_resource.entry(info.resource.clone()).or_insert(0) += 1;
            oldest_age = oldest_age.max(info.acquired_at.elapsed());
        }

        ScopeStats {
            active: scopes.len(),
            by_resource,
            oldest_age,
        }
    }

    /// Snapshot of every live scope, oldest first.
    pub fn active_scopes(&self) -> Vec<ActiveScope> {
        let mut snapshot: Vec<ActiveScope> = self
            .active_scopes
            .lock()
            .iter()
            .map(|(id, info)| ActiveScope {
                id: *id,
                resource: info.resource.clone(),
                acquired_at: info.acquired_at_utc,
                age: info.acquired_at.elapsed(),
            })
            .collect();
        snapshot.sort_by_key(|scope| Reverse(scope.age));
        snapshot
    }

    /// Ids of scopes that have held their resource longer than `threshold`.
    pub fn find_potential_leaks(&self, threshold: Duration) -> Vec<ScopeId> {
        self.active_scopes
            .lock()
            .iter()
            .filter(|(_, info)| info.acquired_at.elapsed() > threshold)
            .map(|(id, _)| *id)
            .collect()
    }
}

static GLOBAL_MONITOR: OnceLock<Arc<ScopeMonitor>> = OnceLock::new();

/// The process-wide monitor, created on first use.
pub fn global_monitor() -> Arc<ScopeMonitor> {
    Arc::clone(GLOBAL_MONITOR.get_or_init(ScopeMonitor::shared))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_deregister() {
        let monitor = ScopeMonitor::new();
        assert_eq!(monitor.stats().active, 0);

        let first = ScopeId::new();
        let second = ScopeId::new();
        let third = ScopeId::new();
        monitor.register(first, "localhost:5432");
        monitor.register(second, "localhost:5432");
        monitor.register(third, "data/example.txt");

        let stats = monitor.stats();
        assert_eq!(stats.active, 3);
        assert_eq!(stats.by_resource.get("localhost:5432"), Some(&2));
        assert_eq!(stats.by_resource.get("data/example.txt"), Some(&1));
        assert!(monitor.is_active(second));

        monitor.deregister(second);
        assert!(!monitor.is_active(second));
        assert_eq!(monitor.stats().by_resource.get("localhost:5432"), Some(&1));

        // Deregistering twice is harmless.
        monitor.deregister(second);
        monitor.deregister(first);
        monitor.deregister(third);
        assert_eq!(monitor.stats().active, 0);
    }

    #[test]
    fn leak_search_respects_threshold() {
        let monitor = ScopeMonitor::new();
        let id = ScopeId::new();
        monitor.register(id, "conn");

        assert!(monitor.find_potential_leaks(Duration::from_secs(60)).is_empty());

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(
            monitor.find_potential_leaks(Duration::from_millis(5)),
            vec![id]
        );
    }

    #[test]
    fn snapshot_is_oldest_first() {
        let monitor = ScopeMonitor::new();
        let older = ScopeId::new();
        monitor.register(older, "first");
        std::thread::sleep(Duration::from_millis(5));
        let newer = ScopeId::new();
        monitor.register(newer, "second");

        let snapshot = monitor.active_scopes();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, older);
        assert_eq!(snapshot[1].id, newer);
        assert!(snapshot[0].age >= snapshot[1].age);
    }

    #[test]
    fn global_monitor_is_shared() {
        let a = global_monitor();
        let b = global_monitor();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
