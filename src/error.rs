//! Error types
//!
//! Diffing never fails. Locating and applying patches can, when the live
//! tree handed in by the host does not have the shape the old virtual tree
//! describes, or when an event arrives for a listener that is gone.
//!
//! Author: Moroya Sakamoto

use thiserror::Error;

use crate::dom::{ListenerId, LiveNode};

/// Failure while binding or executing patches against the live tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The old virtual tree says a child exists here, the live tree disagrees.
    #[error("live node {parent:?} has no child at position {position}")]
    MissingChild { parent: LiveNode, position: usize },

    /// A keyed move was scheduled but its live node was never detached.
    #[error("keyed entry {entry} is marked as moved but was never detached")]
    UnboundMove { entry: usize },

    /// Event delivered for a listener the registry does not know.
    #[error("listener {0:?} is not registered")]
    UnknownListener(ListenerId),
}

/// Failure of an event decoder. Always swallowed by dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event decoder failed: {reason}")]
pub struct DecodeError {
    reason: String,
}

impl DecodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// A field path did not resolve in the event payload.
    pub fn missing(path: &[&str]) -> Self {
        Self::new(format!("missing field `{}`", path.join(".")))
    }

    /// A value was present but had the wrong JSON type.
    pub fn expected(what: &str, path: &[&str]) -> Self {
        Self::new(format!("expected {what} at `{}`", path.join(".")))
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_messages() {
        let e = DecodeError::missing(&["target", "value"]);
        assert_eq!(e.reason(), "missing field `target.value`");
        assert_eq!(e.to_string(), "event decoder failed: missing field `target.value`");

        let e = DecodeError::expected("a string", &["key"]);
        assert_eq!(e.reason(), "expected a string at `key`");
    }

    #[test]
    fn test_render_error_display() {
        let e = RenderError::MissingChild {
            parent: LiveNode(7),
            position: 3,
        };
        assert_eq!(e.to_string(), "live node LiveNode(7) has no child at position 3");
    }
}
