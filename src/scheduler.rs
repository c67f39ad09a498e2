//! Round scheduler: the repeating start -> run -> crash -> pause sequence.
//!
//! An explicit loop rather than timer-rescheduling chains, so round timing
//! is inspectable and testable under a virtual clock. The scheduler is the
//! single authoritative owner of round-id assignment: it resumes from one
//! past the highest persisted id at startup and increments by exactly one
//! per round thereafter.

use crate::engine::RoundEngine;
use crate::errors::EngineResult;
use crate::ledger::LedgerStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct RoundScheduler {
    engine: Arc<RoundEngine>,
    ledger: Arc<dyn LedgerStore>,
    pause_between_rounds: Duration,
    running: AtomicBool,
}

impl RoundScheduler {
    pub fn new(
        engine: Arc<RoundEngine>,
        ledger: Arc<dyn LedgerStore>,
        pause_between_rounds: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            ledger,
            pause_between_rounds,
            running: AtomicBool::new(true),
        })
    }

    /// Run rounds until [`stop`](Self::stop) is called.
    ///
    /// A failure to create a round is fatal: the loop halts rather than run
    /// an unrecorded round. A ledger failure while finalizing a crash is
    /// logged and the loop continues with the next round.
    pub async fn run(&self) -> EngineResult<()> {
        let mut next_round_id = self.ledger.highest_round_id().await? + 1;
        tracing::info!(next_round_id, "Scheduler starting");

        while self.running.load(Ordering::SeqCst) {
            let live = self.engine.start_round(next_round_id).await?;
            if let Err(e) = self.engine.run_clock(live).await {
                tracing::error!(round_id = next_round_id, error = %e, "Failed to finalize round");
            }
            next_round_id += 1;
            tokio::time::sleep(self.pause_between_rounds).await;
        }
        tracing::info!("Scheduler stopped");
        Ok(())
    }

    /// Stop after the current round completes.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
