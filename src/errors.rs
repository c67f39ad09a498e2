//! Error types for the round engine.
//!
//! One taxonomy covers the whole engine: input errors are rejected
//! synchronously, state errors clear on the next round, resource errors
//! persist until the player's balance changes, and dependency errors are
//! transient. Commit-time integrity violations in the ledger surface as the
//! corresponding state error with the attempted mutation fully rolled back.

use crate::round::Currency;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No active round or betting closed")]
    RoundNotAcceptingBets,

    #[error("No active round")]
    NoActiveRound,

    #[error("Round {round_id} has already crashed")]
    RoundAlreadyCrashed { round_id: u64 },

    #[error("Player {player_id} has already placed a bet in this round")]
    DuplicateBet { player_id: String },

    #[error("Player {player_id} has already cashed out in this round")]
    AlreadyCashedOut { player_id: String },

    #[error("Player {player_id} has no bet in this round")]
    NoBetThisRound { player_id: String },

    #[error("Insufficient {currency} balance: need {required}, have {available}")]
    InsufficientBalance {
        currency: Currency,
        required: f64,
        available: f64,
    },

    #[error("No {0} price available")]
    PriceUnavailable(Currency),

    #[error("Player {0} not found")]
    PlayerNotFound(String),

    #[error("Round {0} not found")]
    RoundNotFound(u64),

    #[error("Ledger storage error: {0}")]
    Storage(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_context() {
        let err = EngineError::InsufficientBalance {
            currency: Currency::Btc,
            required: 0.5,
            available: 0.1,
        };
        let msg = err.to_string();
        assert!(msg.contains("btc"));
        assert!(msg.contains("0.5"));
        assert!(msg.contains("0.1"));
    }

    #[test]
    fn test_state_error_names_player() {
        let err = EngineError::DuplicateBet {
            player_id: "player1".to_string(),
        };
        assert!(err.to_string().contains("player1"));
    }
}
