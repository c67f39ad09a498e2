//! Crashline - provably fair crash-game round engine.
//!
//! A continuously repeating wagering round: a verifiable random multiplier
//! climbs from 1.0 until it hits a pre-committed crash point; players bet
//! before the round starts and cash out while it runs to lock in a payout.
//! The engine covers crash-point generation (commit/reveal), the round
//! state machine and multiplier clock, and the bet/cashout processor with
//! atomic ledger commits. Transport and upstream price HTTP live outside
//! this crate behind the [`price::PriceSource`] and event seams.

pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod fair;
pub mod ledger;
pub mod price;
pub mod processor;
pub mod round;
pub mod scheduler;
pub mod storage;
pub mod validate;

pub use config::EngineConfig;
pub use engine::RoundEngine;
pub use errors::{EngineError, EngineResult};
pub use events::{EventHub, GameEvent};
pub use ledger::{LedgerStore, MemoryLedger, Player};
pub use price::{PriceOracle, PriceSource};
pub use processor::BetProcessor;
pub use round::{Bet, Cashout, Currency, Round, RoundStatus};
pub use scheduler::RoundScheduler;
pub use storage::RocksLedger;
