use super::helpers::{
    fetch_load_for_update, fetch_load_payment_for_update, fetch_open_bids_for_update,
    has_accepted_bid, insert_load, update_bid, update_load, update_payment,
};
use super::Engine;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{types::Json, Acquire, Executor, Row};
use uuid::Uuid;

use crate::{
    api::LoadAPI,
    auth::{Platform, User},
    entities::{ActorRole, Load, LoadParams, LoadStatus, PaymentStatus},
    error::Error,
    events::Event,
};

impl Engine {
    /// Role-guarded load transitions report the caller's relationship to the load.
    fn authorize_transition(
        &self,
        user: &User,
        action: &str,
        load: &Load,
        requested: LoadStatus,
    ) -> Result<ActorRole, Error> {
        let role = load.role_of(user);

        if !self.is_allowed(user.clone(), action.to_string(), load.clone())? {
            tracing::info!(role = role.name(), action, "transition refused for caller");
            return Err(Error::forbidden_transition(
                load.status.name(),
                requested.name(),
                role.name(),
            ));
        }

        Ok(role)
    }

    pub(super) async fn fetch_load(&self, id: Uuid) -> Result<Load, Error> {
        let mut conn = self.pool.acquire().await?;

        let Json(load): Json<Load> = conn
            .fetch_optional(sqlx::query("SELECT data FROM loads WHERE id = $1").bind(&id))
            .await?
            .ok_or_else(|| Error::not_found("load"))?
            .try_get("data")?;

        Ok(load)
    }
}

#[async_trait]
impl LoadAPI for Engine {
    #[tracing::instrument(skip(self, params))]
    async fn create_load(&self, user: User, params: LoadParams) -> Result<Load, Error> {
        self.authorize(user.clone(), "create_load", Platform::marketplace())?;

        let load = Load::new(user.id, params, Utc::now())?;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;
        insert_load(&mut tx, &load).await?;
        tx.commit().await?;

        tracing::info!(load_id = %load.id, "load created as draft");
        self.publish(Event::LoadCreated { load_id: load.id });

        Ok(load)
    }

    #[tracing::instrument(skip(self))]
    async fn find_load(&self, user: User, id: Uuid) -> Result<Load, Error> {
        let load = self.fetch_load(id).await?;

        self.authorize(user, "read", load.clone())?;

        Ok(load)
    }

    #[tracing::instrument(skip(self, params))]
    async fn update_load(&self, user: User, id: Uuid, params: LoadParams) -> Result<Load, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut load = fetch_load_for_update(&mut tx, &id).await?;

        if !self.is_allowed(user.clone(), "update", load.clone())? {
            return Err(Error::not_owner());
        }

        load.update(params, Utc::now())?;

        update_load(&mut tx, &load).await?;
        tx.commit().await?;

        self.publish(Event::LoadUpdated { load_id: load.id });

        Ok(load)
    }

    #[tracing::instrument(skip(self))]
    async fn post_load(&self, user: User, id: Uuid) -> Result<Load, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut load = fetch_load_for_update(&mut tx, &id).await?;
        let role = self.authorize_transition(&user, "post", &load, LoadStatus::Posted)?;

        load.post(role, Utc::now())?;

        update_load(&mut tx, &load).await?;
        tx.commit().await?;

        tracing::info!("load posted to the marketplace");
        self.publish(Event::LoadPosted { load_id: load.id });

        Ok(load)
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_load(&self, user: User, id: Uuid) -> Result<Load, Error> {
        let now = Utc::now();

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut load = fetch_load_for_update(&mut tx, &id).await?;
        let role = self.authorize_transition(&user, "cancel", &load, LoadStatus::Cancelled)?;

        load.cancel(role, now)?;

        let mut rejected = 0;
        for mut bid in fetch_open_bids_for_update(&mut tx, &id).await? {
            if bid.reject(now) {
                update_bid(&mut tx, &bid).await?;
                rejected += 1;
            }
        }

        update_load(&mut tx, &load).await?;
        tx.commit().await?;

        tracing::info!(rejected, "load cancelled, open bids rejected");
        self.publish(Event::LoadCancelled { load_id: load.id });

        Ok(load)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_load(&self, user: User, id: Uuid) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let load = fetch_load_for_update(&mut tx, &id).await?;

        if !self.is_allowed(user.clone(), "delete", load.clone())? {
            return Err(Error::not_owner());
        }

        if has_accepted_bid(&mut tx, &id).await?
            || fetch_load_payment_for_update(&mut tx, &id).await?.is_some()
        {
            return Err(Error::load_not_deletable());
        }

        tx.execute(sqlx::query("DELETE FROM loads WHERE id = $1").bind(&id))
            .await?;
        tx.commit().await?;

        self.publish(Event::LoadDeleted { load_id: id });

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn advance_load_status(
        &self,
        user: User,
        id: Uuid,
        target: LoadStatus,
        proof_of_delivery: Option<String>,
    ) -> Result<Load, Error> {
        let action = match target {
            LoadStatus::InTransit => "start_transit",
            LoadStatus::Delivered => "deliver",
            LoadStatus::Completed => "complete",
            _ => {
                let load = self.fetch_load(id).await?;
                let role = load.role_of(&user);
                return Err(Error::invalid_transition(
                    load.status.name(),
                    target.name(),
                    role.name(),
                ));
            }
        };

        let proof_of_delivery = if target == LoadStatus::Delivered {
            // the document store is consulted before any row is locked
            tracing::info!("fetching load without lock");
            let load = self.fetch_load(id).await?;
            self.authorize_transition(&user, action, &load, target)?;

            let reference = proof_of_delivery
                .filter(|reference| !reference.trim().is_empty())
                .ok_or_else(|| {
                    Error::validation_error(
                        "proof_of_delivery",
                        "a proof of delivery reference is required",
                    )
                })?;

            if !self.documents.exists(&reference).await? {
                return Err(Error::validation_error(
                    "proof_of_delivery",
                    "document not found in the document store",
                ));
            }

            Some(reference)
        } else {
            None
        };

        let now = Utc::now();

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut load = fetch_load_for_update(&mut tx, &id).await?;
        let role = self.authorize_transition(&user, action, &load, target)?;

        let mut released = None;

        match (target, proof_of_delivery) {
            (LoadStatus::InTransit, _) => load.start_transit(role, now)?,
            (LoadStatus::Delivered, Some(reference)) => load.deliver(role, reference, now)?,
            (LoadStatus::Completed, _) => {
                let current = load.status;
                load.complete(role, now)?;

                let mut payment = fetch_load_payment_for_update(&mut tx, &id)
                    .await?
                    .ok_or_else(|| Error::invariant_violation("booked load has a payment"))?;

                match payment.status {
                    // a disputed payment only moves through dispute resolution
                    PaymentStatus::Disputed => {
                        return Err(Error::invalid_transition(
                            current.name(),
                            target.name(),
                            role.name(),
                        ));
                    }
                    // already paid out to the carrier by a dispute ruling
                    PaymentStatus::Released | PaymentStatus::Completed => (),
                    _ => {
                        self.transfer_to_carrier(&mut payment, "delivery approved".into(), now)
                            .await?;
                        update_payment(&mut tx, &payment).await?;
                        released = Some(payment.id);
                    }
                }
            }
            _ => return Err(Error::unexpected_error()),
        }

        update_load(&mut tx, &load).await?;
        tx.commit().await?;

        tracing::info!(status = load.status.name(), "load advanced");
        self.publish(Event::LoadStatusChanged {
            load_id: load.id,
            status: load.status.name().to_string(),
        });
        if let Some(payment_id) = released {
            self.publish(Event::PaymentReleased { payment_id });
        }

        Ok(load)
    }
}
