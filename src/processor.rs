//! Bet/cashout processor.
//!
//! Validates requests against the live round, computes conversions through
//! the price oracle and delegates atomicity to the ledger. Pre-checks here
//! are advisory; the ledger commit re-enforces uniqueness, balance and round
//! status, so a request racing the crash or a concurrent duplicate resolves
//! at the commit step.

use crate::config::LimitsConfig;
use crate::engine::RoundEngine;
use crate::errors::{EngineError, EngineResult};
use crate::events::{EventHub, GameEvent};
use crate::fair::round2;
use crate::ledger::LedgerStore;
use crate::price::{crypto_to_usd, usd_to_crypto, PriceOracle};
use crate::round::{Bet, Cashout, Currency};
use crate::validate;
use std::sync::Arc;

/// Accepted bet plus the live multiplier at acceptance time (display only).
#[derive(Debug, Clone)]
pub struct BetReceipt {
    pub bet: Bet,
    pub multiplier: f64,
}

/// A player's balances with USD equivalents where a price is obtainable.
#[derive(Debug, Clone)]
pub struct BalanceView {
    pub player_id: String,
    pub balances: Vec<CurrencyBalance>,
}

#[derive(Debug, Clone)]
pub struct CurrencyBalance {
    pub currency: Currency,
    pub amount: f64,
    pub usd_equivalent: Option<f64>,
}

pub struct BetProcessor {
    engine: Arc<RoundEngine>,
    ledger: Arc<dyn LedgerStore>,
    oracle: Arc<PriceOracle>,
    events: EventHub,
    limits: LimitsConfig,
}

impl BetProcessor {
    pub fn new(
        engine: Arc<RoundEngine>,
        ledger: Arc<dyn LedgerStore>,
        oracle: Arc<PriceOracle>,
        events: EventHub,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            engine,
            ledger,
            oracle,
            events,
            limits,
        }
    }

    /// Place a bet in the current round.
    ///
    /// The player record is created on first use. The debit, round append
    /// and audit record commit as one unit; on any rejection the balance is
    /// untouched.
    pub async fn place_bet(
        &self,
        player_id: &str,
        usd_amount: f64,
        currency: Currency,
    ) -> EngineResult<BetReceipt> {
        validate::player_id(player_id)?;
        validate::usd_amount(usd_amount, self.limits.max_bet_usd)?;

        let live = self
            .engine
            .current_round()
            .ok_or(EngineError::RoundNotAcceptingBets)?;
        if live.is_crashed() {
            return Err(EngineError::RoundNotAcceptingBets);
        }

        let price = self.oracle.usd_price(currency).await?;
        let crypto_amount = usd_to_crypto(usd_amount, price)?;

        if self.ledger.get_player(player_id).await?.is_none() {
            self.ledger.create_player(player_id).await?;
        }

        let bet = Bet {
            player_id: player_id.to_string(),
            usd_amount,
            crypto_amount,
            currency,
            price_at_time: price,
        };
        self.ledger.insert_bet(live.round_id, bet.clone()).await?;

        tracing::debug!(
            player_id,
            round_id = live.round_id,
            usd_amount,
            crypto_amount,
            %currency,
            "Bet accepted"
        );
        Ok(BetReceipt {
            bet,
            multiplier: round2(live.multiplier()),
        })
    }

    /// Cash out of the current round at the live multiplier.
    ///
    /// The payout is crypto-denominated (bet stake x multiplier) and priced
    /// in USD at a fresh quote. A cashout can never commit at or beyond the
    /// round's crash point: the multiplier guard here plus the ledger's
    /// status check at commit make the crash transition the deciding point.
    pub async fn cashout(&self, player_id: &str) -> EngineResult<Cashout> {
        validate::player_id(player_id)?;

        let live = self.engine.current_round().ok_or(EngineError::NoActiveRound)?;
        if live.is_crashed() {
            return Err(EngineError::RoundAlreadyCrashed {
                round_id: live.round_id,
            });
        }

        let round = self
            .ledger
            .get_round(live.round_id)
            .await?
            .ok_or(EngineError::RoundNotFound(live.round_id))?;
        let bet = round
            .bet_for(player_id)
            .cloned()
            .ok_or_else(|| EngineError::NoBetThisRound {
                player_id: player_id.to_string(),
            })?;
        if round.has_cashed_out(player_id) {
            return Err(EngineError::AlreadyCashedOut {
                player_id: player_id.to_string(),
            });
        }

        // Guard on the rounded value: it is what gets recorded and paid, and
        // rounding up could otherwise land exactly on the crash point.
        let multiplier = round2(live.multiplier());
        if live.is_crashed() || multiplier >= live.crash_point {
            return Err(EngineError::RoundAlreadyCrashed {
                round_id: live.round_id,
            });
        }

        let price = self.oracle.usd_price(bet.currency).await?;
        let crypto_payout = bet.crypto_amount * multiplier;
        let usd_payout = crypto_to_usd(crypto_payout, price)?;

        let cashout = Cashout {
            player_id: player_id.to_string(),
            multiplier,
            crypto_payout,
            usd_payout,
        };
        self.ledger
            .insert_cashout(live.round_id, cashout.clone(), bet.currency, price)
            .await?;

        tracing::debug!(
            player_id,
            round_id = live.round_id,
            multiplier,
            crypto_payout,
            "Cashout accepted"
        );
        self.events.publish(GameEvent::PlayerCashout {
            player_id: cashout.player_id.clone(),
            multiplier: cashout.multiplier,
            crypto_payout: cashout.crypto_payout,
            usd_payout: cashout.usd_payout,
        });
        Ok(cashout)
    }

    /// Balances for a player with USD equivalents. A missing price leaves
    /// the USD column empty rather than failing the whole query.
    pub async fn balance(&self, player_id: &str) -> EngineResult<BalanceView> {
        validate::player_id(player_id)?;
        let player = self
            .ledger
            .get_player(player_id)
            .await?
            .ok_or_else(|| EngineError::PlayerNotFound(player_id.to_string()))?;

        let mut balances = Vec::new();
        for currency in Currency::all() {
            let amount = player.balance(currency);
            let usd_equivalent = match self.oracle.usd_price(currency).await {
                Ok(price) => crypto_to_usd(amount, price).ok(),
                Err(_) => None,
            };
            balances.push(CurrencyBalance {
                currency,
                amount,
                usd_equivalent,
            });
        }
        Ok(BalanceView {
            player_id: player.player_id,
            balances,
        })
    }
}
