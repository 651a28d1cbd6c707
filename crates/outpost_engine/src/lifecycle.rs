//! Controller lifecycle states.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a controller is in its install/activate lifecycle.
///
/// ```text
/// Parsed → Installing → Installed → Activating → Activated
///              │                         │            │
///              └──────────→ Redundant ←──┴────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Built, nothing run yet.
    #[default]
    Parsed,
    /// Pre-caching the shell.
    Installing,
    /// Shell cached; takes over without waiting for older instances.
    Installed,
    /// Evicting old caches and claiming clients.
    Activating,
    /// Intercepting requests.
    Activated,
    /// Install failed or replaced; intercepts nothing.
    Redundant,
}

impl LifecycleState {
    /// Returns true if moving to `next` is allowed.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Parsed, Installing)
                | (Installing, Installed)
                | (Installed, Activating)
                | (Activating, Activated)
                | (Installing | Installed | Activating | Activated, Redundant)
        )
    }

    /// Returns `next` if the transition is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidStateTransition`] otherwise.
    pub fn transition(self, next: LifecycleState) -> EngineResult<LifecycleState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(EngineError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// Returns true if requests are intercepted in this state.
    pub fn is_controlling(self) -> bool {
        self == LifecycleState::Activated
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
