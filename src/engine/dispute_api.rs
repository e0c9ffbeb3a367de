use super::helpers::{fetch_load_for_update, fetch_load_payment_for_update, update_load, update_payment};
use super::Engine;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Acquire;
use uuid::Uuid;

use crate::{
    api::DisputeAPI,
    auth::User,
    entities::Payment,
    error::Error,
    events::Event,
};

#[async_trait]
impl DisputeAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn resolve_dispute(
        &self,
        user: User,
        load_id: Uuid,
        release_to_carrier: bool,
        reason: String,
    ) -> Result<Payment, Error> {
        let now = Utc::now();

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut load = fetch_load_for_update(&mut tx, &load_id).await?;
        self.authorize(user, "resolve_dispute", load.clone())?;

        let mut payment = fetch_load_payment_for_update(&mut tx, &load_id)
            .await?
            .ok_or_else(|| Error::not_found("payment"))?;

        if payment.status.is_settled() {
            return Err(Error::already_settled(payment.status.name()));
        }

        if !payment.is_disputed() {
            return Err(Error::not_disputed(payment.status.name()));
        }

        self.settle_escrow(&mut load, &mut payment, release_to_carrier, reason, now)
            .await?;

        update_payment(&mut tx, &payment).await?;
        update_load(&mut tx, &load).await?;
        tx.commit().await?;

        tracing::info!(
            release_to_carrier,
            payment_status = payment.status.name(),
            load_status = load.status.name(),
            "dispute resolved"
        );
        self.publish(Event::DisputeResolved {
            load_id,
            payment_id: payment.id,
            released_to_carrier: release_to_carrier,
        });

        Ok(payment)
    }
}
