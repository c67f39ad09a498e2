//! Input validation helpers.
//!
//! Plain data checks performed by the processor before attempting a commit,
//! independent of any storage technology.

use crate::errors::{EngineError, EngineResult};

pub const MAX_PLAYER_ID_LEN: usize = 50;

/// Player ids are short, stable identifiers: letters, digits, underscore,
/// hyphen.
pub fn player_id(id: &str) -> EngineResult<()> {
    if id.trim().is_empty() {
        return Err(EngineError::InvalidInput(
            "Player ID must be a non-empty string".to_string(),
        ));
    }
    if id.len() > MAX_PLAYER_ID_LEN {
        return Err(EngineError::InvalidInput(format!(
            "Player ID must not exceed {} characters",
            MAX_PLAYER_ID_LEN
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(EngineError::InvalidInput(
            "Player ID must contain only letters, numbers, underscores, or hyphens".to_string(),
        ));
    }
    Ok(())
}

pub fn usd_amount(amount: f64, ceiling: f64) -> EngineResult<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(EngineError::InvalidInput(
            "USD amount must be a positive number".to_string(),
        ));
    }
    if amount > ceiling {
        return Err(EngineError::InvalidInput(format!(
            "USD amount must not exceed {}",
            ceiling
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_accepts_normal_ids() {
        assert!(player_id("player1").is_ok());
        assert!(player_id("a_b-C3").is_ok());
    }

    #[test]
    fn test_player_id_rejects_empty_and_long() {
        assert!(player_id("").is_err());
        assert!(player_id("   ").is_err());
        assert!(player_id(&"x".repeat(51)).is_err());
    }

    #[test]
    fn test_player_id_rejects_special_chars() {
        assert!(player_id("p layer").is_err());
        assert!(player_id("p;drop").is_err());
    }

    #[test]
    fn test_usd_amount_bounds() {
        assert!(usd_amount(10.0, 1_000_000.0).is_ok());
        assert!(usd_amount(0.0, 1_000_000.0).is_err());
        assert!(usd_amount(-5.0, 1_000_000.0).is_err());
        assert!(usd_amount(f64::NAN, 1_000_000.0).is_err());
        assert!(usd_amount(1_000_001.0, 1_000_000.0).is_err());
    }
}
