//! Device operational state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operational state of a simulated device.
///
/// # State Transitions
///
/// ```text
/// Unpowered → Booting → Operational ⇄ Paused
///     any   → Failed  → Booting (power on again)
/// ```
///
/// `Unpowered` and `Booting` may also jump straight to `Operational` when the
/// orchestrator stabilizes the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalState {
    /// Never powered on.
    Unpowered,

    /// Powered on, waiting for the boot delay.
    Booting,

    /// Running: handles messages and periodic tasks.
    Operational,

    /// Suspended. Inbound messages stay queued.
    Paused,

    /// Failed. Terminal until powered on again.
    Failed,
}

impl OperationalState {
    /// Check if transition to `next` is valid.
    pub fn can_transition_to(&self, next: OperationalState) -> bool {
        use OperationalState::*;
        matches!(
            (self, next),
            (Unpowered, Booting)
                | (Failed, Booting)
                | (Booting, Operational)
                | (Unpowered, Operational)
                | (Operational, Paused)
                | (Paused, Operational)
                | (_, Failed)
        )
    }

    /// Whether inbound messages are handled in this state.
    pub fn processes_messages(&self) -> bool {
        matches!(self, OperationalState::Booting | OperationalState::Operational)
    }

    /// Whether inbound messages are drained and discarded in this state.
    pub fn discards_messages(&self) -> bool {
        matches!(self, OperationalState::Unpowered | OperationalState::Failed)
    }

    /// Whether the device counts as up.
    pub fn is_operational(&self) -> bool {
        matches!(self, OperationalState::Operational)
    }

    /// Lowercase name used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationalState::Unpowered => "unpowered",
            OperationalState::Booting => "booting",
            OperationalState::Operational => "operational",
            OperationalState::Paused => "paused",
            OperationalState::Failed => "failed",
        }
    }
}

impl fmt::Display for OperationalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
