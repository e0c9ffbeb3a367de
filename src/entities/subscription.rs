use chrono::{DateTime, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

#[derive(Clone, Debug, Serialize, Deserialize, PolarClass)]
pub struct Subscription {
    #[polar(attribute)]
    pub id: Uuid,
    #[polar(attribute)]
    pub user_id: Uuid,
    pub plan_type: String,
    pub billing_cycle: BillingCycle,
    pub seats: i32,
    pub seats_used: i32,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Annual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Active,
    PastDue,
    Cancelled,
}

impl Status {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Subscription {
    /// A new subscription; the owner occupies the first seat.
    pub fn new(
        user_id: Uuid,
        plan_type: String,
        billing_cycle: BillingCycle,
        seats: i32,
        now: DateTime<Utc>,
    ) -> Result<Self, Error> {
        if seats < 1 {
            return Err(Error::validation_error("seats", "at least one seat is required"));
        }

        if plan_type.trim().is_empty() {
            return Err(Error::validation_error("plan_type", "a plan is required"));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            plan_type,
            billing_cycle,
            seats,
            seats_used: 1,
            status: Status::Active,
            created_at: now,
        })
    }

    /// Seats neither occupied nor reserved by outstanding invites.
    pub fn available_seats(&self, reserved: i32) -> i32 {
        self.seats - self.seats_used - reserved
    }

    pub fn ensure_capacity(&self, requested: i32, reserved: i32) -> Result<(), Error> {
        if self.status != Status::Active {
            return Err(Error::subscription_inactive(self.status.name()));
        }

        if requested < 1 {
            return Err(Error::validation_error(
                "seats_to_allocate",
                "at least one seat must be allocated",
            ));
        }

        let available = self.available_seats(reserved);
        if requested > available {
            return Err(Error::insufficient_seats(available.max(0), requested));
        }

        Ok(())
    }

    pub fn occupy_seat(&mut self) -> Result<(), Error> {
        if self.seats_used >= self.seats {
            return Err(Error::invariant_violation("seats_used <= seats"));
        }

        self.seats_used += 1;
        Ok(())
    }

    pub fn vacate_seat(&mut self) -> Result<(), Error> {
        if self.seats_used <= 0 {
            return Err(Error::invariant_violation("seats_used >= 0"));
        }

        self.seats_used -= 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(seats: i32) -> Subscription {
        Subscription::new(
            Uuid::new_v4(),
            "fleet".into(),
            BillingCycle::Monthly,
            seats,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn owner_holds_first_seat() {
        let subscription = subscription(5);

        assert_eq!(subscription.seats_used, 1);
        assert_eq!(subscription.available_seats(0), 4);
    }

    #[test]
    fn capacity_counts_reservations() {
        let mut subscription = subscription(5);
        subscription.seats_used = 3;

        subscription.ensure_capacity(2, 0).unwrap();

        let err = subscription.ensure_capacity(1, 2).unwrap_err();
        assert!(err.is(&Error::insufficient_seats(0, 1)));
        assert_eq!(err.details.unwrap()["available"], 0);
    }

    #[test]
    fn seat_counts_stay_in_bounds() {
        let mut subscription = subscription(1);

        assert!(subscription.occupy_seat().is_err());
        subscription.vacate_seat().unwrap();
        assert!(subscription.vacate_seat().is_err());
        assert_eq!(subscription.seats_used, 0);
    }

    #[test]
    fn inactive_subscription_cannot_invite() {
        let mut subscription = subscription(5);
        subscription.status = Status::PastDue;

        let err = subscription.ensure_capacity(1, 0).unwrap_err();
        assert!(err.is(&Error::subscription_inactive("past_due")));
    }
}
