//! Door loop states.
//!
//! One pass of the door loop moves through these states:
//!
//! - Idle → ReadPending → Granted / Denied / MagicToggle → Idle
//! - ReadPending → Idle (nothing read)
//! - Idle → TriggerOpen → Idle
//! - any state → Stopped
//!
//! # Examples
//!
//! ```
//! use proxgate_door::LoopState;
//!
//! assert!(LoopState::Idle.can_transition_to(&LoopState::ReadPending));
//! assert!(!LoopState::Idle.can_transition_to(&LoopState::Granted));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Between reads; remote triggers and latch sync run here.
    Idle,

    /// Waiting on the reader for a line.
    ReadPending,

    /// An authorized card is opening the door.
    Granted,

    /// An unknown or out-of-hours card was rejected.
    Denied,

    /// A magic card is flipping the forced-unlocked flag.
    MagicToggle,

    /// A remote trigger is opening the door.
    TriggerOpen,

    /// The loop has exited.
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Idle => "Idle",
            LoopState::ReadPending => "ReadPending",
            LoopState::Granted => "Granted",
            LoopState::Denied => "Denied",
            LoopState::MagicToggle => "MagicToggle",
            LoopState::TriggerOpen => "TriggerOpen",
            LoopState::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

impl LoopState {
    /// Whether the loop may move from this state to `target`.
    pub fn can_transition_to(&self, target: &LoopState) -> bool {
        matches!(
            (self, target),
            (_, LoopState::Stopped)
                | (LoopState::Idle, LoopState::ReadPending | LoopState::TriggerOpen)
                | (
                    LoopState::ReadPending,
                    LoopState::Idle
                        | LoopState::Granted
                        | LoopState::Denied
                        | LoopState::MagicToggle
                )
                | (
                    LoopState::Granted
                        | LoopState::Denied
                        | LoopState::MagicToggle
                        | LoopState::TriggerOpen,
                    LoopState::Idle
                )
        )
    }

    /// Whether the door is being driven by a decision in this state.
    pub fn is_actuating(&self) -> bool {
        matches!(
            self,
            LoopState::Granted | LoopState::Denied | LoopState::MagicToggle | LoopState::TriggerOpen
        )
    }
}
