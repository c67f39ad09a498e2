//! Ledger store: players, rounds and the append-only audit trail.
//!
//! The [`LedgerStore`] trait is the engine's atomicity boundary. Each
//! balance-affecting operation (bet, cashout) commits as a single unit:
//! round-side append, balance delta and audit record are either all durably
//! visible or none are. Uniqueness per (round, player) and the round's
//! Pending status are re-checked inside the commit itself, so a concurrent
//! duplicate loses at the commit step rather than being silently merged.

use crate::errors::{EngineError, EngineResult};
use crate::round::{Bet, Cashout, Currency, Round, RoundStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// A player and their per-currency balances. Balances never go negative;
/// any delta that would do so is rejected before any partial effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub player_id: String,
    pub balances: HashMap<Currency, f64>,
    pub created_at: DateTime<Utc>,
}

impl Player {
    pub fn new(player_id: &str) -> Self {
        let mut balances = HashMap::new();
        for currency in Currency::all() {
            balances.insert(currency, 0.0);
        }
        Self {
            player_id: player_id.to_string(),
            balances,
            created_at: Utc::now(),
        }
    }

    pub fn balance(&self, currency: Currency) -> f64 {
        self.balances.get(&currency).copied().unwrap_or(0.0)
    }
}

/// Balance-affecting event kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Bet,
    Cashout,
}

/// Append-only audit record of a balance-affecting event. Never mutated or
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub tx_id: String,
    pub player_id: String,
    pub usd_amount: f64,
    pub crypto_amount: f64,
    pub currency: Currency,
    pub kind: TxKind,
    /// Asset price in effect when the event was recorded
    pub price_at_time: f64,
    pub tx_hash: String,
    pub timestamp: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn record(
        player_id: &str,
        usd_amount: f64,
        crypto_amount: f64,
        currency: Currency,
        kind: TxKind,
        price_at_time: f64,
    ) -> Self {
        let timestamp = Utc::now();
        let mut hasher = Sha256::new();
        hasher.update(format!("{}-{}", player_id, timestamp.timestamp_millis()).as_bytes());
        Self {
            tx_id: Uuid::new_v4().to_string(),
            player_id: player_id.to_string(),
            usd_amount,
            crypto_amount,
            currency,
            kind,
            price_at_time,
            tx_hash: hex::encode(hasher.finalize()),
            timestamp,
        }
    }
}

/// Durable, transactional store behind the round engine.
///
/// `insert_bet` and `insert_cashout` are the atomic multi-record commits:
/// they append to the round's collection, apply the balance delta and append
/// the audit record all-or-nothing, enforcing uniqueness and round status at
/// commit time.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn create_round(&self, round: &Round) -> EngineResult<()>;

    /// Mark a round crashed with its final crash point and end time.
    async fn end_round(
        &self,
        round_id: u64,
        crash_point: f64,
        end_time: DateTime<Utc>,
    ) -> EngineResult<()>;

    async fn get_round(&self, round_id: u64) -> EngineResult<Option<Round>>;

    /// Highest persisted round id, 0 when the store is empty. Round
    /// numbering resumes from one past this value on restart.
    async fn highest_round_id(&self) -> EngineResult<u64>;

    /// Atomic bet commit: append the bet, debit the player's balance by
    /// `bet.crypto_amount`, append a `bet` audit record.
    async fn insert_bet(&self, round_id: u64, bet: Bet) -> EngineResult<()>;

    /// Atomic cashout commit: append the cashout, credit the player's
    /// balance by `cashout.crypto_payout`, append a `cashout` audit record.
    /// Rejects with `RoundAlreadyCrashed` once the round's crash has
    /// committed.
    async fn insert_cashout(
        &self,
        round_id: u64,
        cashout: Cashout,
        currency: Currency,
        price_at_time: f64,
    ) -> EngineResult<()>;

    async fn get_player(&self, player_id: &str) -> EngineResult<Option<Player>>;

    async fn create_player(&self, player_id: &str) -> EngineResult<Player>;

    /// Credit a balance outside of round play (seeding, deposits).
    async fn credit(&self, player_id: &str, currency: Currency, amount: f64) -> EngineResult<f64>;

    async fn player_transactions(&self, player_id: &str) -> EngineResult<Vec<LedgerTransaction>>;
}

/// In-memory ledger for tests and development.
///
/// DashMap shard locks make each commit a critical section; locks are taken
/// in round-then-player order and never held across an await point.
pub struct MemoryLedger {
    rounds: DashMap<u64, Round>,
    players: DashMap<String, Player>,
    transactions: Mutex<Vec<LedgerTransaction>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            rounds: DashMap::new(),
            players: DashMap::new(),
            transactions: Mutex::new(Vec::new()),
        }
    }

    fn append_tx(&self, tx: LedgerTransaction) {
        self.transactions
            .lock()
            .expect("transaction log poisoned")
            .push(tx);
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn create_round(&self, round: &Round) -> EngineResult<()> {
        if self.rounds.contains_key(&round.round_id) {
            return Err(EngineError::Storage(format!(
                "Round {} already exists",
                round.round_id
            )));
        }
        self.rounds.insert(round.round_id, round.clone());
        Ok(())
    }

    async fn end_round(
        &self,
        round_id: u64,
        crash_point: f64,
        end_time: DateTime<Utc>,
    ) -> EngineResult<()> {
        let mut round = self
            .rounds
            .get_mut(&round_id)
            .ok_or(EngineError::RoundNotFound(round_id))?;
        round.status = RoundStatus::Crashed;
        round.crash_point = crash_point;
        round.end_time = Some(end_time);
        Ok(())
    }

    async fn get_round(&self, round_id: u64) -> EngineResult<Option<Round>> {
        Ok(self.rounds.get(&round_id).map(|r| r.clone()))
    }

    async fn highest_round_id(&self) -> EngineResult<u64> {
        Ok(self.rounds.iter().map(|r| *r.key()).max().unwrap_or(0))
    }

    async fn insert_bet(&self, round_id: u64, bet: Bet) -> EngineResult<()> {
        // Round shard lock is the commit critical section.
        let mut round = self
            .rounds
            .get_mut(&round_id)
            .ok_or(EngineError::RoundNotFound(round_id))?;
        if round.status != RoundStatus::Pending {
            return Err(EngineError::RoundNotAcceptingBets);
        }
        if round.bet_for(&bet.player_id).is_some() {
            return Err(EngineError::DuplicateBet {
                player_id: bet.player_id,
            });
        }

        let mut player = self
            .players
            .get_mut(&bet.player_id)
            .ok_or_else(|| EngineError::PlayerNotFound(bet.player_id.clone()))?;
        let available = player.balance(bet.currency);
        if available < bet.crypto_amount {
            return Err(EngineError::InsufficientBalance {
                currency: bet.currency,
                required: bet.crypto_amount,
                available,
            });
        }
        player
            .balances
            .insert(bet.currency, available - bet.crypto_amount);

        self.append_tx(LedgerTransaction::record(
            &bet.player_id,
            bet.usd_amount,
            bet.crypto_amount,
            bet.currency,
            TxKind::Bet,
            bet.price_at_time,
        ));
        round.bets.push(bet);
        Ok(())
    }

    async fn insert_cashout(
        &self,
        round_id: u64,
        cashout: Cashout,
        currency: Currency,
        price_at_time: f64,
    ) -> EngineResult<()> {
        let mut round = self
            .rounds
            .get_mut(&round_id)
            .ok_or(EngineError::RoundNotFound(round_id))?;
        if round.status != RoundStatus::Pending {
            return Err(EngineError::RoundAlreadyCrashed { round_id });
        }
        if round.bet_for(&cashout.player_id).is_none() {
            return Err(EngineError::NoBetThisRound {
                player_id: cashout.player_id,
            });
        }
        if round.has_cashed_out(&cashout.player_id) {
            return Err(EngineError::AlreadyCashedOut {
                player_id: cashout.player_id,
            });
        }

        let mut player = self
            .players
            .get_mut(&cashout.player_id)
            .ok_or_else(|| EngineError::PlayerNotFound(cashout.player_id.clone()))?;
        let balance = player.balance(currency);
        player
            .balances
            .insert(currency, balance + cashout.crypto_payout);

        self.append_tx(LedgerTransaction::record(
            &cashout.player_id,
            cashout.usd_payout,
            cashout.crypto_payout,
            currency,
            TxKind::Cashout,
            price_at_time,
        ));
        round.cashouts.push(cashout);
        Ok(())
    }

    async fn get_player(&self, player_id: &str) -> EngineResult<Option<Player>> {
        Ok(self.players.get(player_id).map(|p| p.clone()))
    }

    async fn create_player(&self, player_id: &str) -> EngineResult<Player> {
        let player = Player::new(player_id);
        match self.players.entry(player_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => Ok(existing.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(player.clone());
                Ok(player)
            }
        }
    }

    async fn credit(&self, player_id: &str, currency: Currency, amount: f64) -> EngineResult<f64> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(EngineError::InvalidInput(
                "Credit amount must be non-negative".to_string(),
            ));
        }
        let mut player = self
            .players
            .get_mut(player_id)
            .ok_or_else(|| EngineError::PlayerNotFound(player_id.to_string()))?;
        let updated = player.balance(currency) + amount;
        player.balances.insert(currency, updated);
        Ok(updated)
    }

    async fn player_transactions(&self, player_id: &str) -> EngineResult<Vec<LedgerTransaction>> {
        Ok(self
            .transactions
            .lock()
            .expect("transaction log poisoned")
            .iter()
            .filter(|tx| tx.player_id == player_id)
            .cloned()
            .collect())
    }
}
