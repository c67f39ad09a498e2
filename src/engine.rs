//! Round state machine and multiplier clock.
//!
//! The engine owns the single process-wide live round. The clock task
//! recomputes the multiplier every tick from elapsed wall-clock time and
//! detects the crash; the transition to crashed happens exactly once via a
//! compare-and-set on the live round's flag, so a tick racing a request can
//! never crash a round twice or let a cashout through after the flip.

use crate::config::RoundConfig;
use crate::errors::EngineResult;
use crate::events::{EventHub, GameEvent};
use crate::fair::{self, round2};
use crate::ledger::LedgerStore;
use crate::round::Round;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::time::{Instant, MissedTickBehavior};

/// The active round's in-memory mirror. Mutated by the clock (crash flag)
/// and read by request handlers; frozen once crashed.
pub struct LiveRound {
    pub round_id: u64,
    pub hash: String,
    pub crash_point: f64,
    seed: String,
    started_at: Instant,
    growth_rate: f64,
    crashed: AtomicBool,
}

impl LiveRound {
    /// Current raw multiplier: 1 + elapsed seconds x growth rate.
    pub fn multiplier(&self) -> f64 {
        1.0 + self.started_at.elapsed().as_secs_f64() * self.growth_rate
    }

    pub fn is_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }
}

pub struct RoundEngine {
    ledger: Arc<dyn LedgerStore>,
    events: EventHub,
    config: RoundConfig,
    current: RwLock<Option<Arc<LiveRound>>>,
}

impl RoundEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>, events: EventHub, config: RoundConfig) -> Arc<Self> {
        Arc::new(Self {
            ledger,
            events,
            config,
            current: RwLock::new(None),
        })
    }

    /// The live round, if one is active.
    pub fn current_round(&self) -> Option<Arc<LiveRound>> {
        self.current.read().expect("current round lock poisoned").clone()
    }

    /// Start round `round_id`: generate seed and crash point, persist the
    /// round, install it as current and broadcast the commitment hash.
    pub async fn start_round(&self, round_id: u64) -> EngineResult<Arc<LiveRound>> {
        self.start_round_seeded(round_id, fair::generate_seed()).await
    }

    /// Start a round with a caller-supplied seed. Deterministic crash point
    /// for a given (seed, round_id); used for reproducible runs and tests.
    pub async fn start_round_seeded(
        &self,
        round_id: u64,
        seed: String,
    ) -> EngineResult<Arc<LiveRound>> {
        let hash = fair::commitment_hash(&seed, round_id)?;
        let crash_point = fair::generate_crash_point(&seed, round_id)?;

        let round = Round::new(round_id, seed.clone(), hash.clone(), crash_point);
        self.ledger.create_round(&round).await?;

        let live = Arc::new(LiveRound {
            round_id,
            hash: hash.clone(),
            crash_point,
            seed,
            started_at: Instant::now(),
            growth_rate: self.config.growth_rate,
            crashed: AtomicBool::new(false),
        });
        *self.current.write().expect("current round lock poisoned") = Some(live.clone());

        tracing::info!(round_id, crash_point, "Round started");
        self.events.publish(GameEvent::RoundStart { round_id, hash });
        Ok(live)
    }

    /// Drive the multiplier clock for `live` until it crashes.
    ///
    /// Publishes the rounded multiplier every tick. On crash detection the
    /// crashed flag is flipped exactly once, the final round record is
    /// persisted, the crash is broadcast with the revealed seed and the
    /// clock stops. Returns the crash point.
    pub async fn run_clock(&self, live: Arc<LiveRound>) -> EngineResult<f64> {
        let mut tick = tokio::time::interval(self.config.tick_interval());
        // A delayed tick must not burst-fire stale multiplier updates.
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick of tokio's interval completes immediately.
        tick.tick().await;

        loop {
            tick.tick().await;
            let multiplier = live.multiplier();
            if multiplier >= live.crash_point {
                if live
                    .crashed
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    self.finalize_crash(&live).await?;
                }
                break;
            }
            self.events.publish(GameEvent::MultiplierUpdate {
                round_id: live.round_id,
                multiplier: round2(multiplier),
            });
        }
        Ok(live.crash_point)
    }

    async fn finalize_crash(&self, live: &LiveRound) -> EngineResult<()> {
        self.ledger
            .end_round(live.round_id, live.crash_point, Utc::now())
            .await?;
        tracing::info!(
            round_id = live.round_id,
            crash_point = live.crash_point,
            "Round crashed"
        );
        self.events.publish(GameEvent::RoundCrash {
            round_id: live.round_id,
            crash_point: live.crash_point,
            seed: live.seed.clone(),
        });

        let mut current = self.current.write().expect("current round lock poisoned");
        if current
            .as_ref()
            .map(|c| c.round_id == live.round_id)
            .unwrap_or(false)
        {
            *current = None;
        }
        Ok(())
    }
}
