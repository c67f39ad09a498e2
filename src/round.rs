//! Round data model: rounds, bets, cashouts and supported currencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported crypto assets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Btc,
    Eth,
}

impl Currency {
    /// List of all supported currencies
    pub fn all() -> [Currency; 2] {
        [Currency::Btc, Currency::Eth]
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Btc => write!(f, "btc"),
            Currency::Eth => write!(f, "eth"),
        }
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "btc" => Ok(Currency::Btc),
            "eth" => Ok(Currency::Eth),
            other => Err(format!("Currency must be 'btc' or 'eth', got '{}'", other)),
        }
    }
}

/// Round lifecycle status. `Crashed` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Pending,
    Crashed,
}

/// A player's stake in a round. Created once, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bet {
    pub player_id: String,
    pub usd_amount: f64,
    pub crypto_amount: f64,
    pub currency: Currency,
    /// Asset price used for the USD to crypto conversion
    pub price_at_time: f64,
}

/// A payout locked in at the live multiplier before crash. Immutable once
/// recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cashout {
    pub player_id: String,
    pub multiplier: f64,
    /// bet.crypto_amount x multiplier
    pub crypto_payout: f64,
    /// crypto_payout priced at the quote current at cashout time
    pub usd_payout: f64,
}

/// One complete play cycle from multiplier start to crash.
///
/// The crash point is fixed at creation but only provable after the seed is
/// revealed at crash time; until then clients hold only the commitment hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub round_id: u64,
    pub seed: String,
    /// SHA-256 commitment over seed + round_id, published at round start
    pub hash: String,
    pub crash_point: f64,
    pub status: RoundStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// At most one bet per player id, enforced at ledger commit
    pub bets: Vec<Bet>,
    /// At most one cashout per player id, and only for players with a bet
    pub cashouts: Vec<Cashout>,
}

impl Round {
    pub fn new(round_id: u64, seed: String, hash: String, crash_point: f64) -> Self {
        Self {
            round_id,
            seed,
            hash,
            crash_point,
            status: RoundStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            bets: Vec::new(),
            cashouts: Vec::new(),
        }
    }

    pub fn bet_for(&self, player_id: &str) -> Option<&Bet> {
        self.bets.iter().find(|b| b.player_id == player_id)
    }

    pub fn has_cashed_out(&self, player_id: &str) -> bool {
        self.cashouts.iter().any(|c| c.player_id == player_id)
    }

    /// Structural invariants that must hold for any persisted round:
    /// unique bettors, unique cashouts, and cashouts only from bettors.
    pub fn invariants_hold(&self) -> bool {
        let mut bettors = std::collections::HashSet::new();
        for bet in &self.bets {
            if !bettors.insert(bet.player_id.as_str()) {
                return false;
            }
        }
        let mut cashed = std::collections::HashSet::new();
        for cashout in &self.cashouts {
            if !cashed.insert(cashout.player_id.as_str()) {
                return false;
            }
            if !bettors.contains(cashout.player_id.as_str()) {
                return false;
            }
        }
        if self.status == RoundStatus::Crashed && self.end_time.is_none() {
            return false;
        }
        self.crash_point >= 1.0
    }
}
