mod bid_api;
mod dispute_api;
mod helpers;
mod load_api;
mod payment_api;
mod seat_api;
mod sweep_api;

use std::sync::Arc;

use oso::Oso;
use sqlx::{Executor, Pool, Postgres};
use tokio::sync::broadcast;

use crate::{
    api::API,
    auth::authorizor,
    config::Policy,
    error::Error,
    events::{Envelope, Event, EventBus},
    external::{DocumentStore, PaymentRail},
};

type Database = Postgres;

pub struct Engine {
    pool: Pool<Database>,
    authorizor: Oso,
    rail: Arc<dyn PaymentRail>,
    documents: Arc<dyn DocumentStore>,
    policy: Policy,
    events: EventBus,
}

impl Engine {
    #[tracing::instrument(name = "Engine::new", skip_all)]
    pub async fn new(
        pool: Pool<Database>,
        rail: Arc<dyn PaymentRail>,
        documents: Arc<dyn DocumentStore>,
        policy: Policy,
    ) -> Result<Self, Error> {
        // load service
        pool.execute("CREATE TABLE IF NOT EXISTS loads (id UUID PRIMARY KEY, shipper_id UUID NOT NULL, status VARCHAR NOT NULL, delivered_at TIMESTAMPTZ, data JSONB NOT NULL)")
            .await?;

        // bid service
        pool.execute("CREATE TABLE IF NOT EXISTS bids (id UUID PRIMARY KEY, load_id UUID NOT NULL, carrier_id UUID NOT NULL, status VARCHAR NOT NULL, expires_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL, CONSTRAINT fk_bid_load FOREIGN KEY(load_id) REFERENCES loads(id) ON DELETE CASCADE)")
            .await?;
        pool.execute("CREATE UNIQUE INDEX IF NOT EXISTS bids_one_accepted_per_load ON bids (load_id) WHERE status = 'accepted'")
            .await?;
        pool.execute("CREATE UNIQUE INDEX IF NOT EXISTS bids_one_open_per_carrier ON bids (load_id, carrier_id) WHERE status IN ('pending', 'countered')")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS bids_pending_expiry ON bids (expires_at) WHERE status = 'pending'")
            .await?;

        // payment service
        pool.execute("CREATE TABLE IF NOT EXISTS payments (id UUID PRIMARY KEY, load_id UUID NOT NULL UNIQUE, status VARCHAR NOT NULL, data JSONB NOT NULL, CONSTRAINT fk_payment_load FOREIGN KEY(load_id) REFERENCES loads(id))")
            .await?;

        // seat service
        pool.execute("CREATE TABLE IF NOT EXISTS subscriptions (id UUID PRIMARY KEY, user_id UUID NOT NULL, status VARCHAR NOT NULL, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS team_invites (id UUID PRIMARY KEY, subscription_id UUID NOT NULL, invite_token VARCHAR NOT NULL UNIQUE, status VARCHAR NOT NULL, expires_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL, CONSTRAINT fk_invite_subscription FOREIGN KEY(subscription_id) REFERENCES subscriptions(id))")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS profiles (user_id UUID PRIMARY KEY, subscription_id UUID NOT NULL, data JSONB NOT NULL, CONSTRAINT fk_profile_subscription FOREIGN KEY(subscription_id) REFERENCES subscriptions(id))")
            .await?;

        Ok(Self {
            pool,
            authorizor: authorizor::new()?,
            rail,
            documents,
            policy,
            events: EventBus::new(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.events.subscribe()
    }

    fn publish(&self, event: Event) {
        self.events.publish(event);
    }
}

impl Engine {
    pub fn is_allowed<Actor, Action, Resource>(
        &self,
        actor: Actor,
        action: Action,
        resource: Resource,
    ) -> Result<bool, Error>
    where
        Actor: oso::ToPolar,
        Action: oso::ToPolar,
        Resource: oso::ToPolar,
    {
        Ok(self.authorizor.is_allowed(actor, action, resource)?)
    }

    pub fn authorize<Actor, Action, Resource>(
        &self,
        actor: Actor,
        action: Action,
        resource: Resource,
    ) -> Result<(), Error>
    where
        Actor: oso::ToPolar,
        Action: oso::ToPolar,
        Resource: oso::ToPolar,
    {
        if self.is_allowed(actor, action, resource)? {
            return Ok(());
        }

        Err(Error::unauthorized_error())
    }
}

impl API for Engine {}
