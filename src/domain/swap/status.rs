//! SwapStatus enum for tracking the lifecycle of trade proposals.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::StateMachine;

/// Lifecycle status of a swap.
///
/// ```text
/// pending ──receiver──▶ accepted
///    │ └───receiver──▶ declined
///    └─────sender────▶ canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SwapStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
    Canceled,
}

impl SwapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapStatus::Pending => "pending",
            SwapStatus::Accepted => "accepted",
            SwapStatus::Declined => "declined",
            SwapStatus::Canceled => "canceled",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SwapStatus::Pending)
    }
}

impl StateMachine for SwapStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SwapStatus::*;
        matches!(
            (self, target),
            (Pending, Accepted) | (Pending, Declined) | (Pending, Canceled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SwapStatus::*;
        match self {
            Pending => vec![Accepted, Declined, Canceled],
            Accepted | Declined | Canceled => vec![],
        }
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SwapStatus; 4] = [
        SwapStatus::Pending,
        SwapStatus::Accepted,
        SwapStatus::Declined,
        SwapStatus::Canceled,
    ];

    #[test]
    fn default_is_pending() {
        assert_eq!(SwapStatus::default(), SwapStatus::Pending);
    }

    #[test]
    fn only_pending_has_exits() {
        for status in ALL {
            assert_eq!(status.is_terminal(), status != SwapStatus::Pending);
        }
    }

    #[test]
    fn terminal_states_reject_every_target() {
        for from in [SwapStatus::Accepted, SwapStatus::Declined, SwapStatus::Canceled] {
            for to in ALL {
                assert!(from.transition_to(to).is_err(), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn pending_cannot_transition_to_itself() {
        assert!(!SwapStatus::Pending.can_transition_to(&SwapStatus::Pending));
    }

    #[test]
    fn serializes_to_snake_case_json() {
        assert_eq!(
            serde_json::to_string(&SwapStatus::Canceled).unwrap(),
            "\"canceled\""
        );
        let status: SwapStatus = serde_json::from_str("\"accepted\"").unwrap();
        assert_eq!(status, SwapStatus::Accepted);
    }
}
