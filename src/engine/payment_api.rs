use super::helpers::{
    fetch_payment_for_update, fetch_payment_with_load_for_update, update_load, update_payment,
};
use super::Engine;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, Acquire, Executor, Row};
use uuid::Uuid;

use crate::{
    api::PaymentAPI,
    auth::User,
    entities::{ActorRole, Load, LoadStatus, Payment},
    error::Error,
    events::Event,
    external::FundsMovement,
};

impl Engine {
    /// Pays the escrowed amount out to the carrier. The caller holds the payment row
    /// lock, so the rail is asked at most once per committed release; a failed rail
    /// call leaves the payment as it was.
    pub(super) async fn transfer_to_carrier(
        &self,
        payment: &mut Payment,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        payment.ensure_movable()?;

        let movement = FundsMovement::transfer(
            payment.id,
            Self::charge_reference(payment)?,
            payment.carrier_id,
            payment.amount,
        );

        let receipt = self.rail.transfer(&movement).await?;
        tracing::info!(reference = %receipt.reference, settled = receipt.settled, "funds transferred");

        payment.release(reason, receipt.settled, now)
    }

    /// Returns the escrowed amount to the shipper.
    pub(super) async fn refund_to_shipper(
        &self,
        payment: &mut Payment,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        payment.ensure_movable()?;

        let movement = FundsMovement::refund(
            payment.id,
            Self::charge_reference(payment)?,
            payment.shipper_id,
            payment.amount,
        );

        let receipt = self.rail.refund(&movement).await?;
        tracing::info!(reference = %receipt.reference, "funds refunded");

        payment.refund(reason, now)
    }

    async fn move_escrow(
        &self,
        user: User,
        id: Uuid,
        to_carrier: bool,
        reason: String,
    ) -> Result<Payment, Error> {
        let now = Utc::now();

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let (mut load, mut payment) = fetch_payment_with_load_for_update(&mut tx, &id).await?;
        payment.ensure_movable()?;

        let action = if to_carrier { "release" } else { "refund" };
        self.authorize(user, action, payment.clone())?;

        let previous = load.status;
        self.settle_escrow(&mut load, &mut payment, to_carrier, reason, now)
            .await?;

        update_payment(&mut tx, &payment).await?;
        update_load(&mut tx, &load).await?;
        tx.commit().await?;

        tracing::info!(
            payment_status = payment.status.name(),
            load_status = load.status.name(),
            "escrow moved"
        );
        if to_carrier {
            self.publish(Event::PaymentReleased { payment_id: payment.id });
        } else {
            self.publish(Event::PaymentRefunded { payment_id: payment.id });
        }
        if load.status != previous {
            self.publish(Event::LoadStatusChanged {
                load_id: load.id,
                status: load.status.name().to_string(),
            });
        }

        Ok(payment)
    }

    /// Moves escrowed funds and carries the load along with them. Paying the carrier
    /// completes a delivered load; returning the funds cancels the load. Funds still
    /// held in escrow only go to the carrier once the load is delivered.
    pub(super) async fn settle_escrow(
        &self,
        load: &mut Load,
        payment: &mut Payment,
        to_carrier: bool,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        payment.ensure_movable()?;

        if !to_carrier {
            load.cancel_unfunded(now)?;
            return self.refund_to_shipper(payment, reason, now).await;
        }

        match load.status {
            LoadStatus::Delivered => load.complete(ActorRole::Admin, now)?,
            _ if payment.is_held() => return Err(Error::load_not_delivered(load.status.name())),
            _ => (),
        }

        self.transfer_to_carrier(payment, reason, now).await
    }

    fn charge_reference(payment: &Payment) -> Result<String, Error> {
        payment
            .external_reference
            .clone()
            .ok_or_else(|| Error::invariant_violation("escrowed payment has a charge reference"))
    }
}

#[async_trait]
impl PaymentAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn find_payment(&self, user: User, id: Uuid) -> Result<Payment, Error> {
        let mut conn = self.pool.acquire().await?;

        let Json(payment): Json<Payment> = conn
            .fetch_optional(sqlx::query("SELECT data FROM payments WHERE id = $1").bind(&id))
            .await?
            .ok_or_else(|| Error::not_found("payment"))?
            .try_get("data")?;

        self.authorize(user, "read", payment.clone())?;

        Ok(payment)
    }

    #[tracing::instrument(skip(self))]
    async fn open_escrow(
        &self,
        user: User,
        id: Uuid,
        external_charge_ref: String,
    ) -> Result<Payment, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut payment = fetch_payment_for_update(&mut tx, &id).await?;
        self.authorize(user, "open_escrow", payment.clone())?;

        payment.hold(external_charge_ref, Utc::now())?;

        update_payment(&mut tx, &payment).await?;
        tx.commit().await?;

        tracing::info!("funds held in escrow");
        self.publish(Event::EscrowOpened { payment_id: payment.id });

        Ok(payment)
    }

    #[tracing::instrument(skip(self))]
    async fn release(&self, user: User, id: Uuid, reason: String) -> Result<Payment, Error> {
        self.move_escrow(user, id, true, reason).await
    }

    #[tracing::instrument(skip(self))]
    async fn refund(&self, user: User, id: Uuid, reason: String) -> Result<Payment, Error> {
        self.move_escrow(user, id, false, reason).await
    }

    #[tracing::instrument(skip(self))]
    async fn flag_dispute(
        &self,
        user: User,
        id: Uuid,
        dispute_reason: String,
    ) -> Result<Payment, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut payment = fetch_payment_for_update(&mut tx, &id).await?;
        self.authorize(user, "flag_dispute", payment.clone())?;

        payment.dispute(dispute_reason, Utc::now())?;

        update_payment(&mut tx, &payment).await?;
        tx.commit().await?;

        tracing::info!("payment frozen pending dispute resolution");
        self.publish(Event::DisputeFlagged { payment_id: payment.id });

        Ok(payment)
    }

    #[tracing::instrument(skip(self))]
    async fn confirm_settlement(&self, user: User, id: Uuid) -> Result<Payment, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut payment = fetch_payment_for_update(&mut tx, &id).await?;
        self.authorize(user, "settle", payment.clone())?;

        payment.settle(Utc::now())?;

        update_payment(&mut tx, &payment).await?;
        tx.commit().await?;

        self.publish(Event::PaymentSettled { payment_id: payment.id });

        Ok(payment)
    }

    #[tracing::instrument(skip(self))]
    async fn mark_failed(&self, user: User, id: Uuid, reason: String) -> Result<Payment, Error> {
        let now = Utc::now();

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let (mut load, mut payment) = fetch_payment_with_load_for_update(&mut tx, &id).await?;
        self.authorize(user, "mark_failed", payment.clone())?;

        payment.fail(reason, now)?;
        load.cancel_unfunded(now)?;

        update_payment(&mut tx, &payment).await?;
        update_load(&mut tx, &load).await?;
        tx.commit().await?;

        tracing::warn!("processor reported a failed charge, load cancelled");
        self.publish(Event::PaymentFailed { payment_id: payment.id });
        self.publish(Event::LoadStatusChanged {
            load_id: load.id,
            status: load.status.name().to_string(),
        });

        Ok(payment)
    }
}
