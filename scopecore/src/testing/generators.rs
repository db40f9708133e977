//! Property test generators for scope scenarios.
//!
//! A [`Scenario`] fixes the outcome of each phase of one scope. Feeding
//! [`arb_scenario`] to `proptest` covers every combination of acquire, body
//! and release succeeding or failing.

use proptest::prelude::*;

use super::probe::{Probe, ProbeParams};

/// How acquisition ends in a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The resource is fully set up.
    Complete,
    /// The resource is handed out but only partially initialised.
    Partial,
    /// Acquisition fails.
    Fails,
}

/// Outcome of each phase of a single scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    /// How acquisition ends.
    pub acquire: AcquireOutcome,
    /// The body returns an error.
    pub body_fails: bool,
    /// Release returns an error.
    pub release_fails: bool,
}

impl Scenario {
    /// Whether acquisition fails.
    pub const fn acquire_fails(&self) -> bool {
        matches!(self.acquire, AcquireOutcome::Fails)
    }

    /// Probe parameters that reproduce this scenario for resource `name`.
    pub fn params(&self, name: &str, probe: &Probe) -> ProbeParams {
        let params = ProbeParams::new(name, probe);
        let params = match self.acquire {
            AcquireOutcome::Complete => params,
            AcquireOutcome::Partial => params.partial(),
            AcquireOutcome::Fails => params.failing_acquire(),
        };
        if self.release_fails {
            params.failing_release()
        } else {
            params
        }
    }
}

/// Generates each way acquisition can end.
pub fn arb_acquire_outcome() -> impl Strategy<Value = AcquireOutcome> {
    prop_oneof![
        Just(AcquireOutcome::Complete),
        Just(AcquireOutcome::Partial),
        Just(AcquireOutcome::Fails),
    ]
}

/// Generates every combination of phase outcomes.
///
/// # Example
/// ```rust,ignore
/// proptest! {
///     #[test]
///     fn released_once(scenario in arb_scenario()) {
///         let probe = Probe::new();
///         let _ = with_scope(scenario.params("r", &probe), |_| Ok::<_, E>(()));
///         prop_assert!(probe.release_count("r") <= 1);
///     }
/// }
/// ```
pub fn arb_scenario() -> impl Strategy<Value = Scenario> {
    (arb_acquire_outcome(), any::<bool>(), any::<bool>()).prop_map(
        |(acquire, body_fails, release_fails)| Scenario {
            acquire,
            body_fails,
            release_fails,
        },
    )
}

/// Generates a stack of scenarios for nested scopes, outermost first.
pub fn arb_nested_scenarios(max_depth: usize) -> impl Strategy<Value = Vec<Scenario>> {
    prop::collection::vec(arb_scenario(), 1..=max_depth.max(1))
}

/// Generates resource names safe to use as probe keys.
pub fn arb_resource_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}"
}
