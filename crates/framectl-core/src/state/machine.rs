//! Device-mode state machine.

use std::fmt;

/// Where the controller is in the life of a frame connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePhase {
    /// Looking for a supported frame.
    #[default]
    Searching,
    /// Frame found as a mass-storage device.
    StorageMode,
    /// Mode switch sent, waiting for re-enumeration.
    Switching,
    /// Frame open and configured in display mode.
    DisplayMode,
    /// Setup handshake done; images may be sent.
    Armed,
    /// Image upload in progress.
    Transferring,
}

impl fmt::Display for DevicePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevicePhase::Searching => write!(f, "Searching"),
            DevicePhase::StorageMode => write!(f, "Storage Mode"),
            DevicePhase::Switching => write!(f, "Switching"),
            DevicePhase::DisplayMode => write!(f, "Display Mode"),
            DevicePhase::Armed => write!(f, "Armed"),
            DevicePhase::Transferring => write!(f, "Transferring"),
        }
    }
}

impl DevicePhase {
    /// Whether `next` is a legal successor of this phase.
    pub fn can_transition_to(&self, next: DevicePhase) -> bool {
        use DevicePhase::*;
        matches!(
            (self, next),
            (Searching, StorageMode)
                | (Searching, DisplayMode)
                | (StorageMode, Switching)
                | (Switching, DisplayMode)
                | (Switching, Searching)
                | (DisplayMode, Armed)
                | (Armed, Armed)
                | (Armed, Transferring)
                | (Transferring, Armed)
        )
    }
}

/// Runtime state of one controller session.
#[derive(Debug, Default)]
pub struct SessionState {
    pub phase: DevicePhase,
    /// Outcome of the last setup handshake (`false` on response mismatch).
    pub setup_verified: Option<bool>,
    /// Images fully written.
    pub images_sent: usize,
    /// Payload bytes fully written (headers and padding excluded).
    pub bytes_sent: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to a new phase.
    pub fn goto_phase(&mut self, next: DevicePhase) {
        if !self.phase.can_transition_to(next) {
            tracing::warn!(from = %self.phase, to = %next, "Unexpected phase transition");
        }
        tracing::debug!(from = %self.phase, to = %next, "Phase transition");
        self.phase = next;
    }

    pub fn is_armed(&self) -> bool {
        self.phase == DevicePhase::Armed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use DevicePhase::*;
        let path = [
            Searching,
            StorageMode,
            Switching,
            DisplayMode,
            Armed,
            Transferring,
            Armed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_cannot_transfer_before_setup() {
        assert!(!DevicePhase::DisplayMode.can_transition_to(DevicePhase::Transferring));
        assert!(!DevicePhase::Searching.can_transition_to(DevicePhase::Armed));
    }

    #[test]
    fn test_goto_phase_records_phase() {
        let mut state = SessionState::new();
        state.goto_phase(DevicePhase::DisplayMode);
        state.goto_phase(DevicePhase::Armed);
        assert!(state.is_armed());
    }
}
