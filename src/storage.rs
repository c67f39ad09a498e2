//! Durable ledger on RocksDB.
//!
//! Records are bincode-encoded under prefixed keys. Each bet/cashout commit
//! is a read-modify-write of the affected round and player records applied
//! through a single `WriteBatch`, so the round append, balance delta and
//! audit record land all-or-nothing. Per-round and per-player lock tables
//! serialize commits touching the same record; unrelated players proceed in
//! parallel.

use crate::errors::{EngineError, EngineResult};
use crate::ledger::{LedgerStore, LedgerTransaction, Player, TxKind};
use crate::round::{Bet, Cashout, Currency, Round, RoundStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rocksdb::{Options, WriteBatch, DB};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const LAST_ROUND_KEY: &[u8] = b"meta:last_round_id";

fn round_key(round_id: u64) -> Vec<u8> {
    format!("round:{:020}", round_id).into_bytes()
}

fn player_key(player_id: &str) -> Vec<u8> {
    format!("player:{}", player_id).into_bytes()
}

fn tx_key(tx: &LedgerTransaction) -> Vec<u8> {
    // Timestamp first so a prefix scan returns a player's records in order.
    format!(
        "tx:{}:{:020}:{}",
        tx.player_id,
        tx.timestamp.timestamp_millis(),
        tx.tx_id
    )
    .into_bytes()
}

pub struct RocksLedger {
    db: DB,
    round_locks: DashMap<u64, Arc<Mutex<()>>>,
    player_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RocksLedger {
    pub fn open(path: &Path) -> EngineResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)
            .map_err(|e| EngineError::Storage(format!("Failed to open ledger db: {}", e)))?;
        Ok(Self {
            db,
            round_locks: DashMap::new(),
            player_locks: DashMap::new(),
        })
    }

    fn round_lock(&self, round_id: u64) -> Arc<Mutex<()>> {
        self.round_locks
            .entry(round_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn player_lock(&self, player_id: &str) -> Arc<Mutex<()>> {
        self.player_locks
            .entry(player_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn get_record<T: serde::de::DeserializeOwned>(&self, key: &[u8]) -> EngineResult<Option<T>> {
        let bytes = self
            .db
            .get(key)
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        match bytes {
            Some(bytes) => {
                let record = bincode::deserialize(&bytes)
                    .map_err(|e| EngineError::Storage(format!("Corrupt record: {}", e)))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn put_record<T: serde::Serialize>(
        batch: &mut WriteBatch,
        key: &[u8],
        record: &T,
    ) -> EngineResult<()> {
        let bytes = bincode::serialize(record)
            .map_err(|e| EngineError::Storage(format!("Encode failed: {}", e)))?;
        batch.put(key, bytes);
        Ok(())
    }

    fn commit(&self, batch: WriteBatch) -> EngineResult<()> {
        self.db
            .write(batch)
            .map_err(|e| EngineError::Storage(format!("Commit failed: {}", e)))
    }

    fn load_round(&self, round_id: u64) -> EngineResult<Round> {
        self.get_record::<Round>(&round_key(round_id))?
            .ok_or(EngineError::RoundNotFound(round_id))
    }

    fn load_player(&self, player_id: &str) -> EngineResult<Player> {
        self.get_record::<Player>(&player_key(player_id))?
            .ok_or_else(|| EngineError::PlayerNotFound(player_id.to_string()))
    }
}

fn lock<'a>(mutex: &'a Mutex<()>) -> MutexGuard<'a, ()> {
    mutex.lock().expect("ledger lock poisoned")
}

#[async_trait]
impl LedgerStore for RocksLedger {
    async fn create_round(&self, round: &Round) -> EngineResult<()> {
        let round_lock = self.round_lock(round.round_id);
        let _guard = lock(&round_lock);

        if self.get_record::<Round>(&round_key(round.round_id))?.is_some() {
            return Err(EngineError::Storage(format!(
                "Round {} already exists",
                round.round_id
            )));
        }
        let last = self
            .get_record::<u64>(LAST_ROUND_KEY)?
            .unwrap_or(0)
            .max(round.round_id);

        let mut batch = WriteBatch::default();
        Self::put_record(&mut batch, &round_key(round.round_id), round)?;
        Self::put_record(&mut batch, LAST_ROUND_KEY, &last)?;
        self.commit(batch)
    }

    async fn end_round(
        &self,
        round_id: u64,
        crash_point: f64,
        end_time: DateTime<Utc>,
    ) -> EngineResult<()> {
        let round_lock = self.round_lock(round_id);
        let _guard = lock(&round_lock);

        let mut round = self.load_round(round_id)?;
        round.status = RoundStatus::Crashed;
        round.crash_point = crash_point;
        round.end_time = Some(end_time);

        let mut batch = WriteBatch::default();
        Self::put_record(&mut batch, &round_key(round_id), &round)?;
        self.commit(batch)?;

        // A crashed round takes no further commits; drop its lock entry so
        // the table does not grow with the round count.
        self.round_locks.remove(&round_id);
        Ok(())
    }

    async fn get_round(&self, round_id: u64) -> EngineResult<Option<Round>> {
        self.get_record(&round_key(round_id))
    }

    async fn highest_round_id(&self) -> EngineResult<u64> {
        Ok(self.get_record::<u64>(LAST_ROUND_KEY)?.unwrap_or(0))
    }

    async fn insert_bet(&self, round_id: u64, bet: Bet) -> EngineResult<()> {
        let round_lock = self.round_lock(round_id);
        let player_lock = self.player_lock(&bet.player_id);
        let _round_guard = lock(&round_lock);
        let _player_guard = lock(&player_lock);

        let mut round = self.load_round(round_id)?;
        if round.status != RoundStatus::Pending {
            return Err(EngineError::RoundNotAcceptingBets);
        }
        if round.bet_for(&bet.player_id).is_some() {
            return Err(EngineError::DuplicateBet {
                player_id: bet.player_id,
            });
        }

        let mut player = self.load_player(&bet.player_id)?;
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

        let tx = LedgerTransaction::record(
            &bet.player_id,
            bet.usd_amount,
            bet.crypto_amount,
            bet.currency,
            TxKind::Bet,
            bet.price_at_time,
        );
        round.bets.push(bet);

        let mut batch = WriteBatch::default();
        Self::put_record(&mut batch, &round_key(round_id), &round)?;
        Self::put_record(&mut batch, &player_key(&player.player_id), &player)?;
        Self::put_record(&mut batch, &tx_key(&tx), &tx)?;
        self.commit(batch)
    }

    async fn insert_cashout(
        &self,
        round_id: u64,
        cashout: Cashout,
        currency: Currency,
        price_at_time: f64,
    ) -> EngineResult<()> {
        let round_lock = self.round_lock(round_id);
        let player_lock = self.player_lock(&cashout.player_id);
        let _round_guard = lock(&round_lock);
        let _player_guard = lock(&player_lock);

        let mut round = self.load_round(round_id)?;
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

        let mut player = self.load_player(&cashout.player_id)?;
        let balance = player.balance(currency);
        player
            .balances
            .insert(currency, balance + cashout.crypto_payout);

        let tx = LedgerTransaction::record(
            &cashout.player_id,
            cashout.usd_payout,
            cashout.crypto_payout,
            currency,
            TxKind::Cashout,
            price_at_time,
        );
        round.cashouts.push(cashout);

        let mut batch = WriteBatch::default();
        Self::put_record(&mut batch, &round_key(round_id), &round)?;
        Self::put_record(&mut batch, &player_key(&player.player_id), &player)?;
        Self::put_record(&mut batch, &tx_key(&tx), &tx)?;
        self.commit(batch)
    }

    async fn get_player(&self, player_id: &str) -> EngineResult<Option<Player>> {
        self.get_record(&player_key(player_id))
    }

    async fn create_player(&self, player_id: &str) -> EngineResult<Player> {
        let player_lock = self.player_lock(player_id);
        let _guard = lock(&player_lock);

        if let Some(existing) = self.get_record::<Player>(&player_key(player_id))? {
            return Ok(existing);
        }
        let player = Player::new(player_id);
        let mut batch = WriteBatch::default();
        Self::put_record(&mut batch, &player_key(player_id), &player)?;
        self.commit(batch)?;
        Ok(player)
    }

    async fn credit(&self, player_id: &str, currency: Currency, amount: f64) -> EngineResult<f64> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(EngineError::InvalidInput(
                "Credit amount must be non-negative".to_string(),
            ));
        }
        let player_lock = self.player_lock(player_id);
        let _guard = lock(&player_lock);

        let mut player = self.load_player(player_id)?;
        let updated = player.balance(currency) + amount;
        player.balances.insert(currency, updated);

        let mut batch = WriteBatch::default();
        Self::put_record(&mut batch, &player_key(player_id), &player)?;
        self.commit(batch)?;
        Ok(updated)
    }

    async fn player_transactions(&self, player_id: &str) -> EngineResult<Vec<LedgerTransaction>> {
        let prefix = format!("tx:{}:", player_id).into_bytes();
        let mut records = Vec::new();
        let iter = self
            .db
            .iterator(rocksdb::IteratorMode::From(&prefix, rocksdb::Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(|e| EngineError::Storage(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let tx: LedgerTransaction = bincode::deserialize(&value)
                .map_err(|e| EngineError::Storage(format!("Corrupt record: {}", e)))?;
            records.push(tx);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, RocksLedger) {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = RocksLedger::open(dir.path()).expect("open ledger");
        (dir, ledger)
    }

    fn bet(player: &str, crypto_amount: f64) -> Bet {
        Bet {
            player_id: player.to_string(),
            usd_amount: crypto_amount * 60_000.0,
            crypto_amount,
            currency: Currency::Btc,
            price_at_time: 60_000.0,
        }
    }

    #[tokio::test]
    async fn test_round_records_persist() {
        let (_dir, ledger) = open_temp();
        let round = Round::new(7, "seed".into(), "hash".into(), 3.2);
        ledger.create_round(&round).await.unwrap();

        let loaded = ledger.get_round(7).await.unwrap().unwrap();
        assert_eq!(loaded.round_id, 7);
        assert_eq!(loaded.crash_point, 3.2);
        assert_eq!(loaded.status, RoundStatus::Pending);
        assert_eq!(ledger.highest_round_id().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_bet_commit_is_atomic_across_records() {
        let (_dir, ledger) = open_temp();
        ledger
            .create_round(&Round::new(1, "s".into(), "h".into(), 2.5))
            .await
            .unwrap();
        ledger.create_player("p1").await.unwrap();
        ledger.credit("p1", Currency::Btc, 0.001).await.unwrap();

        ledger.insert_bet(1, bet("p1", 0.0004)).await.unwrap();

        let round = ledger.get_round(1).await.unwrap().unwrap();
        assert_eq!(round.bets.len(), 1);
        let player = ledger.get_player("p1").await.unwrap().unwrap();
        assert!((player.balance(Currency::Btc) - 0.0006).abs() < 1e-12);
        let txs = ledger.player_transactions("p1").await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].kind, TxKind::Bet);
    }

    #[tokio::test]
    async fn test_duplicate_bet_rejected_with_no_partial_effects() {
        let (_dir, ledger) = open_temp();
        ledger
            .create_round(&Round::new(1, "s".into(), "h".into(), 2.5))
            .await
            .unwrap();
        ledger.create_player("p1").await.unwrap();
        ledger.credit("p1", Currency::Btc, 0.001).await.unwrap();
        ledger.insert_bet(1, bet("p1", 0.0002)).await.unwrap();

        let err = ledger.insert_bet(1, bet("p1", 0.0002)).await.unwrap_err();
        assert!(matches!(err, EngineError::DuplicateBet { .. }));

        let player = ledger.get_player("p1").await.unwrap().unwrap();
        assert!((player.balance(Currency::Btc) - 0.0008).abs() < 1e-12);
        assert_eq!(ledger.player_transactions("p1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cashout_rejected_after_crash_commit() {
        let (_dir, ledger) = open_temp();
        ledger
            .create_round(&Round::new(1, "s".into(), "h".into(), 2.5))
            .await
            .unwrap();
        ledger.create_player("p1").await.unwrap();
        ledger.credit("p1", Currency::Btc, 0.001).await.unwrap();
        ledger.insert_bet(1, bet("p1", 0.0002)).await.unwrap();
        ledger.end_round(1, 2.5, Utc::now()).await.unwrap();

        let cashout = Cashout {
            player_id: "p1".to_string(),
            multiplier: 2.4,
            crypto_payout: 0.00048,
            usd_payout: 28.8,
        };
        let err = ledger
            .insert_cashout(1, cashout, Currency::Btc, 60_000.0)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RoundAlreadyCrashed { .. }));

        // Stake stays forfeited.
        let player = ledger.get_player("p1").await.unwrap().unwrap();
        assert!((player.balance(Currency::Btc) - 0.0008).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_round_lock_entry_dropped_after_crash() {
        let (_dir, ledger) = open_temp();
        ledger
            .create_round(&Round::new(1, "s".into(), "h".into(), 2.5))
            .await
            .unwrap();
        assert!(ledger.round_locks.contains_key(&1));

        ledger.end_round(1, 2.5, Utc::now()).await.unwrap();
        assert!(!ledger.round_locks.contains_key(&1));
        // The crashed round itself stays readable.
        assert!(ledger.get_round(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reopen_resumes_round_numbering() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let ledger = RocksLedger::open(dir.path()).unwrap();
            for id in 1..=3 {
                ledger
                    .create_round(&Round::new(id, "s".into(), "h".into(), 2.0))
                    .await
                    .unwrap();
            }
        }
        let ledger = RocksLedger::open(dir.path()).unwrap();
        assert_eq!(ledger.highest_round_id().await.unwrap(), 3);
        assert!(ledger.get_round(2).await.unwrap().is_some());
    }
}
