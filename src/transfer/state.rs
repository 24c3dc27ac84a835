//! Transaction State Machine
//!
//! ```text
//! PENDING → PROCESSING → COMPLETED
//!                ↓
//!              FAILED
//! ```
//!
//! `PENDING → PROCESSING` is the claim. COMPLETED and FAILED are terminal;
//! nothing leaves a terminal state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transaction lifecycle status, stored as lower-case TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Initial state - intent recorded, not yet claimed
    Pending,

    /// Claimed by exactly one worker inside an open unit of work
    Processing,

    /// Terminal: ledger entries written
    Completed,

    /// Terminal: business rule violated after the claim, no entries written
    Failed,
}

impl TransactionStatus {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed
        )
    }

    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Processing)
                | (TransactionStatus::Processing, TransactionStatus::Completed)
                | (TransactionStatus::Processing, TransactionStatus::Failed)
        )
    }

    /// Get the stored / human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "processing" => Ok(TransactionStatus::Processing),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TransactionStatus; 4] = [
        TransactionStatus::Pending,
        TransactionStatus::Processing,
        TransactionStatus::Completed,
        TransactionStatus::Failed,
    ];

    #[test]
    fn test_terminal_states() {
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());

        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(!TransactionStatus::Processing.is_terminal());
    }

    #[test]
    fn test_legal_transitions() {
        use TransactionStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Pending));
    }

    #[test]
    fn test_nothing_leaves_terminal() {
        for terminal in ALL.iter().filter(|s| s.is_terminal()) {
            for next in ALL {
                assert!(!terminal.can_transition_to(next), "{} -> {}", terminal, next);
            }
        }
    }

    #[test]
    fn test_parse_display() {
        for state in ALL {
            assert_eq!(state.to_string().parse::<TransactionStatus>().unwrap(), state);
        }
        assert!("cancelled".parse::<TransactionStatus>().is_err());
    }
}
