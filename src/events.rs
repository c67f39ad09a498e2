//! Round lifecycle events, consumed by transport collaborators.
//!
//! Notifications are a wake-up mechanism for subscribers; the canonical
//! source of truth is the ledger. `RoundStart` carries only the commitment
//! hash; the seed is revealed in `RoundCrash` so clients can verify the
//! round after the fact.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum GameEvent {
    #[serde(rename_all = "camelCase")]
    RoundStart { round_id: u64, hash: String },

    #[serde(rename_all = "camelCase")]
    MultiplierUpdate { round_id: u64, multiplier: f64 },

    #[serde(rename_all = "camelCase")]
    RoundCrash {
        round_id: u64,
        crash_point: f64,
        seed: String,
    },

    #[serde(rename_all = "camelCase")]
    PlayerCashout {
        player_id: String,
        multiplier: f64,
        crypto_payout: f64,
        usd_payout: f64,
    },
}

/// Broadcast hub for lifecycle events. Publishing never blocks; a send with
/// no subscribers is a no-op.
#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<GameEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: GameEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let hub = EventHub::new(16);
        let mut rx = hub.subscribe();
        hub.publish(GameEvent::RoundStart {
            round_id: 1,
            hash: "h".to_string(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            GameEvent::RoundStart {
                round_id: 1,
                hash: "h".to_string()
            }
        );
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let hub = EventHub::new(16);
        hub.publish(GameEvent::MultiplierUpdate {
            round_id: 1,
            multiplier: 1.5,
        });
    }

    #[test]
    fn test_round_start_serialization_withholds_seed() {
        let json = serde_json::to_string(&GameEvent::RoundStart {
            round_id: 3,
            hash: "abcd".to_string(),
        })
        .unwrap();
        assert!(json.contains("\"roundId\":3"));
        assert!(json.contains("roundStart"));
        assert!(!json.contains("seed"));
    }

    #[test]
    fn test_round_crash_reveals_seed() {
        let json = serde_json::to_string(&GameEvent::RoundCrash {
            round_id: 3,
            crash_point: 2.5,
            seed: "s3cret".to_string(),
        })
        .unwrap();
        assert!(json.contains("\"crashPoint\":2.5"));
        assert!(json.contains("s3cret"));
    }
}
