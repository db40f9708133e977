//! Core types shared by every scope flavour.
//!
//! `ResourceState` is the runtime lifecycle marker of a scoped resource and
//! `ScopeId` identifies one scope in logs and in the [`ScopeMonitor`].
//!
//! [`ScopeMonitor`]: crate::monitor::ScopeMonitor

use std::fmt;

use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a scoped resource.
///
/// The only legal transitions are `Unacquired -> Acquired -> Released`.
/// There is no way back from `Released`; reuse requires a new scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    /// Nothing has been acquired yet.
    Unacquired,
    /// The resource is held and may be used by the scope body.
    Acquired,
    /// The resource has been returned to the environment.
    Released,
}

impl ResourceState {
    /// Whether the wrapped resource may be used in this state.
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Acquired)
    }

    /// Whether this state is terminal.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Released)
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unacquired => "unacquired",
            Self::Acquired => "acquired",
            Self::Released => "released",
        };
        f.write_str(label)
    }
}

const fn is_v7(id: &Uuid) -> bool {
    id.get_version_num() == 7
}

/// Identifier of a single scope, using UUIDv7 so ids sort by creation time.
#[nutype(
    validate(predicate = is_v7),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ScopeId(Uuid);

impl ScopeId {
    /// Creates a new `ScopeId` stamped with the current time.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display_is_lowercase() {
        assert_eq!(ResourceState::Unacquired.to_string(), "unacquired");
        assert_eq!(ResourceState::Acquired.to_string(), "acquired");
        assert_eq!(ResourceState::Released.to_string(), "released");
    }

    #[test]
    fn only_acquired_is_usable() {
        assert!(!ResourceState::Unacquired.is_usable());
        assert!(ResourceState::Acquired.is_usable());
        assert!(!ResourceState::Released.is_usable());
        assert!(ResourceState::Released.is_terminal());
    }

    #[test]
    fn state_serializes_as_lowercase_string() {
        let json = serde_json::to_string(&ResourceState::Released).unwrap();
        assert_eq!(json, "\"released\"");

        let parsed: ResourceState = serde_json::from_str("\"acquired\"").unwrap();
        assert_eq!(parsed, ResourceState::Acquired);
    }

    #[test]
    fn scope_ids_are_unique_v7() {
        let first = ScopeId::new();
        let second = ScopeId::new();
        assert_eq!(first.get_version(), Some(uuid::Version::SortRand));
        assert_ne!(first, second);
        assert!(ScopeId::try_new(Uuid::nil()).is_err());
    }
}
