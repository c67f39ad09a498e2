//! End-to-end round flow tests on a virtual clock.

use crashline::config::{LimitsConfig, RoundConfig};
use crashline::engine::RoundEngine;
use crashline::errors::EngineError;
use crashline::events::{EventHub, GameEvent};
use crashline::fair;
use crashline::ledger::{LedgerStore, MemoryLedger, TxKind};
use crashline::price::{FixedPriceSource, PriceOracle};
use crashline::processor::BetProcessor;
use crashline::round::{Currency, RoundStatus};
use crashline::scheduler::RoundScheduler;
use crashline::storage::RocksLedger;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    ledger: Arc<MemoryLedger>,
    engine: Arc<RoundEngine>,
    processor: Arc<BetProcessor>,
    events: EventHub,
}

fn harness(round: RoundConfig) -> Harness {
    let ledger = Arc::new(MemoryLedger::new());
    let source = Arc::new(FixedPriceSource::with_defaults());
    let oracle = Arc::new(PriceOracle::new(source, Duration::from_secs(10)));
    let events = EventHub::new(8192);
    let engine = RoundEngine::new(ledger.clone(), events.clone(), round);
    let processor = Arc::new(BetProcessor::new(
        engine.clone(),
        ledger.clone(),
        oracle,
        events.clone(),
        LimitsConfig::default(),
    ));
    Harness {
        ledger,
        engine,
        processor,
        events,
    }
}

fn default_round() -> RoundConfig {
    RoundConfig {
        tick_interval_ms: 100,
        growth_rate: 0.1,
        pause_between_rounds_ms: 10_000,
    }
}

async fn fund(ledger: &MemoryLedger, player: &str, currency: Currency, amount: f64) {
    ledger.create_player(player).await.unwrap();
    ledger.credit(player, currency, amount).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn full_round_with_bet_cashout_and_crash() {
    let h = harness(default_round());
    fund(&h.ledger, "alice", Currency::Btc, 0.001).await;
    fund(&h.ledger, "bob", Currency::Eth, 1.0).await;

    // "seed40" commits round 1 to crash at 2.51.
    let live = h
        .engine
        .start_round_seeded(1, "seed40".to_string())
        .await
        .unwrap();
    assert_eq!(live.crash_point, 2.51);

    let clock = {
        let engine = h.engine.clone();
        let live = live.clone();
        tokio::spawn(async move { engine.run_clock(live).await })
    };

    // Both players bet at the start of the round.
    let alice_bet = h
        .processor
        .place_bet("alice", 10.0, Currency::Btc)
        .await
        .unwrap();
    h.processor
        .place_bet("bob", 30.0, Currency::Eth)
        .await
        .unwrap();

    // Alice cashes out at 1.80, well before the 2.51 crash.
    let mut rx = h.events.subscribe();
    loop {
        if let GameEvent::MultiplierUpdate { multiplier, .. } = rx.recv().await.unwrap() {
            if multiplier >= 1.8 {
                break;
            }
        }
    }
    let cashout = h.processor.cashout("alice").await.unwrap();
    assert!(cashout.multiplier >= 1.8 && cashout.multiplier < 2.51);
    assert!(
        (cashout.crypto_payout - alice_bet.bet.crypto_amount * cashout.multiplier).abs() < 1e-12
    );

    // Bob rides past the crash point and forfeits his stake.
    let crash_point = clock.await.unwrap().unwrap();
    assert_eq!(crash_point, 2.51);
    let err = h.processor.cashout("bob").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::RoundAlreadyCrashed { .. } | EngineError::NoActiveRound
    ));

    let round = h.ledger.get_round(1).await.unwrap().unwrap();
    assert_eq!(round.status, RoundStatus::Crashed);
    assert_eq!(round.bets.len(), 2);
    assert_eq!(round.cashouts.len(), 1);
    assert!(round.invariants_hold());
    assert!(fair::verify_commitment(&round.seed, 1, &round.hash).unwrap());
    assert_eq!(
        fair::generate_crash_point(&round.seed, 1).unwrap(),
        round.crash_point
    );

    // Audit trail: one bet each, one cashout for alice only.
    let alice_txs = h.ledger.player_transactions("alice").await.unwrap();
    assert_eq!(alice_txs.len(), 2);
    assert!(alice_txs.iter().any(|t| t.kind == TxKind::Cashout));
    let bob_txs = h.ledger.player_transactions("bob").await.unwrap();
    assert_eq!(bob_txs.len(), 1);
    assert_eq!(bob_txs[0].kind, TxKind::Bet);

    // Bob's balance reflects only the debit.
    let bob = h.ledger.get_player("bob").await.unwrap().unwrap();
    assert!((bob.balance(Currency::Eth) - (1.0 - bob_txs[0].crypto_amount)).abs() < 1e-12);
}

#[tokio::test(start_paused = true)]
async fn bets_rejected_between_rounds() {
    let h = harness(default_round());
    fund(&h.ledger, "alice", Currency::Btc, 0.001).await;

    // "seed8" commits round 1 to crash instantly at the 1.0 floor.
    let live = h
        .engine
        .start_round_seeded(1, "seed8".to_string())
        .await
        .unwrap();
    assert_eq!(live.crash_point, 1.0);
    h.engine.run_clock(live).await.unwrap();

    let err = h
        .processor
        .place_bet("alice", 10.0, Currency::Btc)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RoundNotAcceptingBets));
}

#[tokio::test(start_paused = true)]
async fn cashout_racing_crash_never_pays_at_or_beyond_crash_point() {
    let h = harness(default_round());
    fund(&h.ledger, "alice", Currency::Btc, 0.001).await;

    let live = h
        .engine
        .start_round_seeded(1, "seed40".to_string())
        .await
        .unwrap();
    h.processor
        .place_bet("alice", 10.0, Currency::Btc)
        .await
        .unwrap();

    let clock = {
        let engine = h.engine.clone();
        let live = live.clone();
        tokio::spawn(async move { engine.run_clock(live).await })
    };
    clock.await.unwrap().unwrap();

    // The crash has committed; a straggling cashout must lose the race.
    let err = h.processor.cashout("alice").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::RoundAlreadyCrashed { .. } | EngineError::NoActiveRound
    ));
    let round = h.ledger.get_round(1).await.unwrap().unwrap();
    assert!(round.cashouts.is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_bets_from_distinct_players_all_land() {
    let h = harness(default_round());
    for i in 0..10 {
        fund(&h.ledger, &format!("p{}", i), Currency::Btc, 0.001).await;
    }
    h.engine
        .start_round_seeded(1, "seed0".to_string())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let processor = h.processor.clone();
        handles.push(tokio::spawn(async move {
            processor
                .place_bet(&format!("p{}", i), 10.0, Currency::Btc)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let round = h.ledger.get_round(1).await.unwrap().unwrap();
    assert_eq!(round.bets.len(), 10);
    assert!(round.invariants_hold());
}

#[tokio::test(start_paused = true)]
async fn scheduler_chains_rounds_and_resumes_numbering() {
    let ledger = Arc::new(MemoryLedger::new());
    let events = EventHub::new(8192);
    let round = RoundConfig {
        tick_interval_ms: 100,
        growth_rate: 10.0,
        pause_between_rounds_ms: 10_000,
    };
    let engine = RoundEngine::new(ledger.clone(), events.clone(), round.clone());
    let scheduler = RoundScheduler::new(engine, ledger.clone(), Duration::from_secs(10));

    let mut rx = events.subscribe();
    let task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run().await })
    };

    let mut starts = Vec::new();
    let mut crashes = Vec::new();
    while crashes.len() < 2 {
        match rx.recv().await.unwrap() {
            GameEvent::RoundStart { round_id, .. } => starts.push(round_id),
            GameEvent::RoundCrash { round_id, .. } => crashes.push(round_id),
            _ => {}
        }
    }
    scheduler.stop();
    task.abort();

    assert!(starts.starts_with(&[1, 2]));
    assert_eq!(crashes, vec![1, 2]);

    // A scheduler over the same ledger picks up after the highest round.
    let engine2 = RoundEngine::new(ledger.clone(), events.clone(), round);
    let scheduler2 = RoundScheduler::new(engine2, ledger.clone(), Duration::from_secs(10));
    let mut rx2 = events.subscribe();
    let task2 = tokio::spawn(async move { scheduler2.run().await });
    let resumed = loop {
        if let GameEvent::RoundStart { round_id, .. } = rx2.recv().await.unwrap() {
            break round_id;
        }
    };
    task2.abort();
    let highest = ledger.highest_round_id().await.unwrap();
    assert_eq!(resumed, highest);
    assert!(resumed > 2);
}

#[tokio::test(start_paused = true)]
async fn rocks_ledger_full_round_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ledger = Arc::new(RocksLedger::open(dir.path()).unwrap());
        let source = Arc::new(FixedPriceSource::with_defaults());
        let oracle = Arc::new(PriceOracle::new(source, Duration::from_secs(10)));
        let events = EventHub::new(8192);
        let engine = RoundEngine::new(ledger.clone(), events.clone(), default_round());
        let processor = BetProcessor::new(
            engine.clone(),
            ledger.clone(),
            oracle,
            events,
            LimitsConfig::default(),
        );

        ledger.create_player("alice").await.unwrap();
        ledger.credit("alice", Currency::Btc, 0.001).await.unwrap();

        let live = engine.start_round_seeded(1, "seed40".to_string()).await.unwrap();
        processor.place_bet("alice", 10.0, Currency::Btc).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        processor.cashout("alice").await.unwrap();
        engine.run_clock(live).await.unwrap();
    }

    let ledger = RocksLedger::open(dir.path()).unwrap();
    assert_eq!(ledger.highest_round_id().await.unwrap(), 1);
    let round = ledger.get_round(1).await.unwrap().unwrap();
    assert_eq!(round.status, RoundStatus::Crashed);
    assert_eq!(round.bets.len(), 1);
    assert_eq!(round.cashouts.len(), 1);
    assert_eq!(round.cashouts[0].multiplier, 1.8);
    assert!(round.invariants_hold());

    let txs = ledger.player_transactions("alice").await.unwrap();
    assert_eq!(txs.len(), 2);
}
