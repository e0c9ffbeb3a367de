//! Domain events published after a successful commit.
//!
//! Delivery is best effort over a broadcast channel: a lagging or absent
//! subscriber never affects the operation that produced the event.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    LoadCreated { load_id: Uuid },
    LoadUpdated { load_id: Uuid },
    LoadPosted { load_id: Uuid },
    LoadCancelled { load_id: Uuid },
    LoadDeleted { load_id: Uuid },
    LoadStatusChanged { load_id: Uuid, status: String },
    BidSubmitted { load_id: Uuid, bid_id: Uuid },
    BidCountered { load_id: Uuid, bid_id: Uuid },
    CounterAnswered { load_id: Uuid, bid_id: Uuid, accepted: bool },
    BidAccepted { load_id: Uuid, bid_id: Uuid, payment_id: Uuid },
    BidsExpired { count: u64 },
    EscrowOpened { payment_id: Uuid },
    PaymentReleased { payment_id: Uuid },
    PaymentSettled { payment_id: Uuid },
    PaymentRefunded { payment_id: Uuid },
    PaymentFailed { payment_id: Uuid },
    DisputeFlagged { payment_id: Uuid },
    DisputeResolved { load_id: Uuid, payment_id: Uuid, released_to_carrier: bool },
    SubscriptionCreated { subscription_id: Uuid },
    InviteCreated { subscription_id: Uuid, invite_id: Uuid },
    InviteClaimed { subscription_id: Uuid, invite_id: Uuid, user_id: Uuid },
    InviteRevoked { subscription_id: Uuid, invite_id: Uuid },
    InvitesExpired { count: u64 },
    TeamMemberRemoved { subscription_id: Uuid, user_id: Uuid },
}

#[derive(Clone, Debug, Serialize)]
pub struct Envelope {
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Envelope>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: Event) {
        let envelope = Envelope {
            occurred_at: Utc::now(),
            event,
        };

        match self.sender.send(envelope) {
            Ok(receivers) => tracing::debug!(receivers, "event published"),
            Err(_) => tracing::debug!("event published (no receivers)"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        let load_id = Uuid::new_v4();
        bus.publish(Event::LoadPosted { load_id });

        let envelope = receiver.recv().await.unwrap();
        assert_eq!(envelope.event, Event::LoadPosted { load_id });
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let bus = EventBus::new();
        bus.publish(Event::BidsExpired { count: 0 });
    }
}
