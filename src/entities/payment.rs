use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{Bid, Load};
use crate::error::Error;

/// Escrow record for a booked load. `amount` is fixed at creation and never rewritten.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub load_id: Uuid,
    pub bid_id: Uuid,
    pub shipper_id: Uuid,
    pub carrier_id: Uuid,
    pub amount: i64,
    pub status: Status,
    pub external_reference: Option<String>,
    pub escrow_held_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub disputed_at: Option<DateTime<Utc>>,
    pub dispute_reason: Option<String>,
    pub resolution_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    HeldInEscrow,
    Released,
    Completed,
    Disputed,
    Refunded,
    Failed,
}

impl Status {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::HeldInEscrow => "held_in_escrow",
            Self::Released => "released",
            Self::Completed => "completed",
            Self::Disputed => "disputed",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        }
    }

    /// Funds have already left escrow in one direction or the other.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::Released | Self::Completed | Self::Refunded | Self::Failed
        )
    }
}

impl PolarClass for Payment {
    fn get_polar_class_builder() -> oso::ClassBuilder<Payment> {
        oso::Class::builder()
            .name("Payment")
            .add_attribute_getter("id", |recv: &Payment| recv.id.clone())
            .add_attribute_getter("shipper_id", |recv: &Payment| recv.shipper_id.clone())
            .add_attribute_getter("carrier_id", |recv: &Payment| recv.carrier_id.clone())
            .add_attribute_getter("status", |recv: &Payment| recv.status.name().to_string())
    }

    fn get_polar_class() -> oso::Class {
        let builder = Payment::get_polar_class_builder();
        builder.build()
    }
}

impl Payment {
    pub fn new(load: &Load, bid: &Bid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            load_id: load.id,
            bid_id: bid.id,
            shipper_id: load.shipper_id,
            carrier_id: bid.carrier_id,
            amount: bid.amount,
            status: Status::Pending,
            external_reference: None,
            escrow_held_at: None,
            released_at: None,
            completed_at: None,
            refunded_at: None,
            failed_at: None,
            disputed_at: None,
            dispute_reason: None,
            resolution_reason: None,
            created_at: now,
        }
    }

    pub fn is_disputed(&self) -> bool {
        self.status == Status::Disputed
    }

    pub fn is_held(&self) -> bool {
        self.status == Status::HeldInEscrow
    }

    #[tracing::instrument(skip(self), fields(payment_id = %self.id))]
    pub fn hold(&mut self, external_reference: String, now: DateTime<Utc>) -> Result<(), Error> {
        if self.status != Status::Pending {
            return Err(Error::already_escrowed());
        }

        if external_reference.trim().is_empty() {
            return Err(Error::validation_error(
                "external_charge_ref",
                "a charge reference is required",
            ));
        }

        self.status = Status::HeldInEscrow;
        self.external_reference = Some(external_reference);
        self.escrow_held_at = Some(now);
        Ok(())
    }

    /// Checks funds are still in escrow and may be paid out or returned.
    pub fn ensure_movable(&self) -> Result<(), Error> {
        match self.status {
            Status::HeldInEscrow | Status::Disputed => Ok(()),
            Status::Pending => Err(Error::not_escrowed(self.status.name())),
            _ => Err(Error::already_settled(self.status.name())),
        }
    }

    /// Pays the carrier. `settled` is the rail's report of whether the transfer already cleared.
    #[tracing::instrument(skip(self), fields(payment_id = %self.id))]
    pub fn release(&mut self, reason: String, settled: bool, now: DateTime<Utc>) -> Result<(), Error> {
        self.ensure_movable()?;

        self.status = Status::Released;
        self.released_at = Some(now);
        self.resolution_reason = Some(reason);

        if settled {
            self.settle(now)?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(payment_id = %self.id))]
    pub fn settle(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        match self.status {
            Status::Released => {
                self.status = Status::Completed;
                self.completed_at = Some(now);
                Ok(())
            }
            Status::Completed | Status::Refunded | Status::Failed => {
                Err(Error::already_settled(self.status.name()))
            }
            _ => Err(Error::not_released(self.status.name())),
        }
    }

    #[tracing::instrument(skip(self), fields(payment_id = %self.id))]
    pub fn refund(&mut self, reason: String, now: DateTime<Utc>) -> Result<(), Error> {
        self.ensure_movable()?;

        self.status = Status::Refunded;
        self.refunded_at = Some(now);
        self.resolution_reason = Some(reason);
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(payment_id = %self.id))]
    pub fn dispute(&mut self, reason: String, now: DateTime<Utc>) -> Result<(), Error> {
        if self.status.is_settled() {
            return Err(Error::already_settled(self.status.name()));
        }

        if self.status != Status::HeldInEscrow {
            return Err(Error::not_escrowed(self.status.name()));
        }

        if reason.trim().is_empty() {
            return Err(Error::validation_error("dispute_reason", "a reason is required"));
        }

        self.status = Status::Disputed;
        self.disputed_at = Some(now);
        self.dispute_reason = Some(reason);
        Ok(())
    }

    /// Processor-side failure on a held charge.
    #[tracing::instrument(skip(self), fields(payment_id = %self.id))]
    pub fn fail(&mut self, reason: String, now: DateTime<Utc>) -> Result<(), Error> {
        if self.status.is_settled() {
            return Err(Error::already_settled(self.status.name()));
        }

        if self.status != Status::HeldInEscrow {
            return Err(Error::not_escrowed(self.status.name()));
        }

        self.status = Status::Failed;
        self.failed_at = Some(now);
        self.resolution_reason = Some(reason);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::entities::{LoadParams, LoadStatus};

    fn payment() -> Payment {
        let now = Utc::now();
        let mut load = Load::new(Uuid::new_v4(), LoadParams::default(), now).unwrap();
        let bid = Bid::new(load.id, Uuid::new_v4(), 52_000, None, Duration::hours(72), now).unwrap();
        load.status = LoadStatus::Posted;
        load.book(bid.carrier_id, bid.amount, now).unwrap();

        Payment::new(&load, &bid, now)
    }

    #[test]
    fn opened_for_the_bid_amount() {
        let payment = payment();

        assert_eq!(payment.status, Status::Pending);
        assert_eq!(payment.amount, 52_000);
    }

    #[test]
    fn hold_is_not_repeatable() {
        let now = Utc::now();
        let mut payment = payment();

        payment.hold("ch_1".into(), now).unwrap();
        let err = payment.hold("ch_2".into(), now).unwrap_err();

        assert!(err.is(&Error::already_escrowed()));
        assert_eq!(payment.external_reference.as_deref(), Some("ch_1"));
    }

    #[test]
    fn release_requires_escrow() {
        let now = Utc::now();
        let mut payment = payment();

        let err = payment.release("delivered".into(), true, now).unwrap_err();
        assert!(err.is(&Error::not_escrowed("pending")));
        assert_eq!(payment.status, Status::Pending);
    }

    #[test]
    fn release_then_settle() {
        let now = Utc::now();
        let mut payment = payment();
        payment.hold("ch_1".into(), now).unwrap();

        payment.release("delivered".into(), false, now).unwrap();
        assert_eq!(payment.status, Status::Released);

        payment.settle(now).unwrap();
        assert_eq!(payment.status, Status::Completed);
        assert_eq!(payment.amount, 52_000);

        let err = payment.release("again".into(), true, now).unwrap_err();
        assert!(err.is(&Error::already_settled("completed")));
    }

    #[test]
    fn dispute_resolves_exactly_once() {
        let now = Utc::now();
        let mut payment = payment();
        payment.hold("ch_1".into(), now).unwrap();
        payment.dispute("damaged freight".into(), now).unwrap();
        assert!(payment.is_disputed());

        payment.refund("shipper wins".into(), now).unwrap();
        assert_eq!(payment.status, Status::Refunded);

        assert!(payment.refund("again".into(), now).is_err());
        assert!(payment.release("again".into(), true, now).is_err());
        assert_eq!(payment.status, Status::Refunded);
    }

    #[test]
    fn dispute_only_from_escrow() {
        let now = Utc::now();
        let mut payment = payment();

        assert!(payment.dispute("late".into(), now).is_err());

        payment.hold("ch_1".into(), now).unwrap();
        payment.dispute("late".into(), now).unwrap();
        assert!(payment.dispute("late".into(), now).is_err());
        assert!(payment.fail("processor".into(), now).is_err());
    }
}
