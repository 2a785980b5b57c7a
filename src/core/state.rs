//! Transfer lifecycle
//!
//! `Received → Validated → Locked → Applied → Logged → Completed`, with
//! `Failed` reachable from any non-terminal state. No state is skipped and the
//! two terminal states are final.

use crate::types::ReasonCode;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Received,
    Validated,
    Locked,
    Applied,
    Logged,
    Completed,
    Failed(ReasonCode),
}

impl TransferState {
    /// The single state that may follow this one on the success path
    pub fn successor(self) -> Option<TransferState> {
        match self {
            TransferState::Received => Some(TransferState::Validated),
            TransferState::Validated => Some(TransferState::Locked),
            TransferState::Locked => Some(TransferState::Applied),
            TransferState::Applied => Some(TransferState::Logged),
            TransferState::Logged => Some(TransferState::Completed),
            TransferState::Completed | TransferState::Failed(_) => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Failed(_))
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferState::Failed(reason) => write!(f, "Failed({reason})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Tracks one transfer through its lifecycle, logging each transition
#[derive(Debug)]
pub struct TransferProgress {
    request_id: String,
    state: TransferState,
}

impl TransferProgress {
    pub fn new(request_id: &str) -> Self {
        debug!(request_id, state = %TransferState::Received, "transfer state");
        Self {
            request_id: request_id.to_string(),
            state: TransferState::Received,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Move to the next success-path state
    ///
    /// Returns false, leaving the state unchanged, when called from a
    /// terminal state.
    pub fn advance(&mut self) -> bool {
        match self.state.successor() {
            Some(next) => {
                self.state = next;
                debug!(request_id = %self.request_id, state = %next, "transfer state");
                true
            }
            None => false,
        }
    }

    /// Move to `Failed(reason)` unless already terminal
    pub fn fail(&mut self, reason: ReasonCode) {
        if self.state.is_terminal() {
            return;
        }
        self.state = TransferState::Failed(reason);
        debug!(request_id = %self.request_id, state = %self.state, "transfer state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_path_visits_every_state_in_order() {
        let mut progress = TransferProgress::new("r1");
        let mut visited = vec![progress.state()];

        while progress.advance() {
            visited.push(progress.state());
        }

        assert_eq!(
            visited,
            vec![
                TransferState::Received,
                TransferState::Validated,
                TransferState::Locked,
                TransferState::Applied,
                TransferState::Logged,
                TransferState::Completed,
            ]
        );
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut progress = TransferProgress::new("r1");
        progress.advance();
        progress.fail(ReasonCode::InsufficientFunds);

        assert_eq!(progress.state(), TransferState::Failed(ReasonCode::InsufficientFunds));
        assert!(!progress.advance());
        progress.fail(ReasonCode::Contention);
        assert_eq!(progress.state(), TransferState::Failed(ReasonCode::InsufficientFunds));
    }

    #[test]
    fn test_completed_cannot_fail() {
        let mut progress = TransferProgress::new("r1");
        while progress.advance() {}

        progress.fail(ReasonCode::StorageUnavailable);

        assert_eq!(progress.state(), TransferState::Completed);
    }

    #[test]
    fn test_display() {
        assert_eq!(TransferState::Locked.to_string(), "Locked");
        assert_eq!(
            TransferState::Failed(ReasonCode::SameAccount).to_string(),
            "Failed(SAME_ACCOUNT)"
        );
    }
}
