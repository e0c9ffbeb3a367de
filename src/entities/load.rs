use chrono::{DateTime, NaiveDate, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::User;
use crate::entities::Place;
use crate::error::Error;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Load {
    pub id: Uuid,
    pub shipper_id: Uuid,
    pub carrier_id: Option<Uuid>,
    pub status: Status,
    pub posted_rate: Option<i64>,
    pub booked_rate: Option<i64>,
    pub origin: Option<Place>,
    pub destination: Option<Place>,
    pub pickup_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub is_public: bool,
    pub requires_eld: bool,
    pub equipment_type: Option<String>,
    pub weight_lbs: Option<i32>,
    pub notes: Option<String>,
    pub proof_of_delivery: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Draft,
    Posted,
    Bidding,
    Booked,
    InTransit,
    Delivered,
    Completed,
    Cancelled,
}

impl Status {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Posted => "posted",
            Self::Bidding => "bidding",
            Self::Booked => "booked",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// How the caller relates to a load, reported back on rejected transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActorRole {
    Shipper,
    Carrier,
    Admin,
    Other,
}

impl ActorRole {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Shipper => "shipper",
            Self::Carrier => "carrier",
            Self::Admin => "admin",
            Self::Other => "other",
        }
    }
}

/// Editable load fields. Every field is optional so drafts may be saved incomplete.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LoadParams {
    pub origin: Option<Place>,
    pub destination: Option<Place>,
    pub pickup_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub posted_rate: Option<i64>,
    pub is_public: Option<bool>,
    pub requires_eld: Option<bool>,
    pub equipment_type: Option<String>,
    pub weight_lbs: Option<i32>,
    pub notes: Option<String>,
}

impl PolarClass for Load {
    fn get_polar_class_builder() -> oso::ClassBuilder<Load> {
        oso::Class::builder()
            .name("Load")
            .add_attribute_getter("id", |recv: &Load| recv.id.clone())
            .add_attribute_getter("shipper_id", |recv: &Load| recv.shipper_id.clone())
            .add_attribute_getter("carrier_id", |recv: &Load| recv.carrier_id.clone())
            .add_attribute_getter("status", |recv: &Load| recv.status.name().to_string())
            .add_method("is_open_for_bids", |recv: &Load| recv.is_open_for_bids())
    }

    fn get_polar_class() -> oso::Class {
        let builder = Load::get_polar_class_builder();
        builder.build()
    }
}

impl Load {
    pub fn new(shipper_id: Uuid, params: LoadParams, now: DateTime<Utc>) -> Result<Self, Error> {
        let mut load = Self {
            id: Uuid::new_v4(),
            shipper_id,
            carrier_id: None,
            status: Status::Draft,
            posted_rate: None,
            booked_rate: None,
            origin: None,
            destination: None,
            pickup_date: None,
            delivery_date: None,
            is_public: true,
            requires_eld: false,
            equipment_type: None,
            weight_lbs: None,
            notes: None,
            proof_of_delivery: None,
            created_at: now,
            updated_at: now,
            delivered_at: None,
            completed_at: None,
        };

        load.apply(params)?;

        Ok(load)
    }

    pub fn role_of(&self, user: &User) -> ActorRole {
        if user.id == self.shipper_id {
            ActorRole::Shipper
        } else if self.carrier_id == Some(user.id) {
            ActorRole::Carrier
        } else if user.is_admin() {
            ActorRole::Admin
        } else {
            ActorRole::Other
        }
    }

    pub fn is_open_for_bids(&self) -> bool {
        matches!(self.status, Status::Posted | Status::Bidding)
    }

    pub fn is_booked_or_later(&self) -> bool {
        matches!(
            self.status,
            Status::Booked | Status::InTransit | Status::Delivered | Status::Completed
        )
    }

    #[tracing::instrument(skip(self, params), fields(load_id = %self.id))]
    pub fn update(&mut self, params: LoadParams, now: DateTime<Utc>) -> Result<(), Error> {
        match self.status {
            Status::Draft | Status::Posted => {
                self.apply(params)?;
                self.updated_at = now;
                Ok(())
            }
            _ => Err(Error::load_not_editable(self.status.name())),
        }
    }

    #[tracing::instrument(skip(self), fields(load_id = %self.id))]
    pub fn post(&mut self, role: ActorRole, now: DateTime<Utc>) -> Result<(), Error> {
        self.ensure_status(&[Status::Draft], Status::Posted, role)?;
        self.ensure_postable()?;

        self.status = Status::Posted;
        self.updated_at = now;
        Ok(())
    }

    /// Records the arrival of a bid; the first one moves a posted load into bidding.
    pub fn receive_bid(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        match self.status {
            Status::Posted => {
                self.status = Status::Bidding;
                self.updated_at = now;
                Ok(())
            }
            Status::Bidding => Ok(()),
            _ => Err(Error::load_not_biddable(self.status.name())),
        }
    }

    /// Checks the load can take an acceptance, distinguishing a lost race from a closed load.
    pub fn ensure_bookable(&self) -> Result<(), Error> {
        if self.is_booked_or_later() {
            return Err(Error::load_already_booked());
        }

        if !self.is_open_for_bids() {
            return Err(Error::load_not_biddable(self.status.name()));
        }

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(load_id = %self.id))]
    pub fn book(&mut self, carrier_id: Uuid, rate: i64, now: DateTime<Utc>) -> Result<(), Error> {
        self.ensure_bookable()?;

        self.status = Status::Booked;
        self.carrier_id = Some(carrier_id);
        self.booked_rate = Some(rate);
        self.updated_at = now;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(load_id = %self.id))]
    pub fn start_transit(&mut self, role: ActorRole, now: DateTime<Utc>) -> Result<(), Error> {
        self.ensure_status(&[Status::Booked], Status::InTransit, role)?;

        self.status = Status::InTransit;
        self.updated_at = now;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(load_id = %self.id))]
    pub fn deliver(
        &mut self,
        role: ActorRole,
        proof_of_delivery: String,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.ensure_status(&[Status::InTransit], Status::Delivered, role)?;

        if proof_of_delivery.trim().is_empty() {
            return Err(Error::validation_error(
                "proof_of_delivery",
                "a proof of delivery reference is required",
            ));
        }

        self.status = Status::Delivered;
        self.proof_of_delivery = Some(proof_of_delivery);
        self.delivered_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(load_id = %self.id))]
    pub fn complete(&mut self, role: ActorRole, now: DateTime<Utc>) -> Result<(), Error> {
        self.ensure_status(&[Status::Delivered], Status::Completed, role)?;

        self.status = Status::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(load_id = %self.id))]
    pub fn cancel(&mut self, role: ActorRole, now: DateTime<Utc>) -> Result<(), Error> {
        self.ensure_status(
            &[Status::Draft, Status::Posted, Status::Bidding],
            Status::Cancelled,
            role,
        )?;

        self.status = Status::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    /// Closes a booked load whose escrow went back to the shipper or never cleared.
    #[tracing::instrument(skip(self), fields(load_id = %self.id))]
    pub fn cancel_unfunded(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        self.ensure_status(
            &[Status::Booked, Status::InTransit, Status::Delivered],
            Status::Cancelled,
            ActorRole::Admin,
        )?;

        self.status = Status::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    fn ensure_status(
        &self,
        allowed: &[Status],
        requested: Status,
        role: ActorRole,
    ) -> Result<(), Error> {
        if allowed.contains(&self.status) {
            return Ok(());
        }

        Err(Error::invalid_transition(
            self.status.name(),
            requested.name(),
            role.name(),
        ))
    }

    fn ensure_postable(&self) -> Result<(), Error> {
        match &self.origin {
            Some(place) if place.is_complete() => (),
            _ => return Err(Error::validation_error("origin", "origin is required")),
        }

        match &self.destination {
            Some(place) if place.is_complete() => (),
            _ => {
                return Err(Error::validation_error(
                    "destination",
                    "destination is required",
                ))
            }
        }

        if self.pickup_date.is_none() {
            return Err(Error::validation_error("pickup_date", "pickup date is required"));
        }

        if self.delivery_date.is_none() {
            return Err(Error::validation_error(
                "delivery_date",
                "delivery date is required",
            ));
        }

        if self.posted_rate.is_none() {
            return Err(Error::validation_error("posted_rate", "posted rate is required"));
        }

        Ok(())
    }

    fn apply(&mut self, params: LoadParams) -> Result<(), Error> {
        if let Some(rate) = params.posted_rate {
            if rate <= 0 {
                return Err(Error::validation_error("posted_rate", "must be positive"));
            }
        }

        if let Some(weight) = params.weight_lbs {
            if weight <= 0 {
                return Err(Error::validation_error("weight_lbs", "must be positive"));
            }
        }

        let pickup_date = params.pickup_date.or(self.pickup_date);
        let delivery_date = params.delivery_date.or(self.delivery_date);

        if let (Some(pickup), Some(delivery)) = (pickup_date, delivery_date) {
            if delivery < pickup {
                return Err(Error::validation_error(
                    "delivery_date",
                    "must not precede the pickup date",
                ));
            }
        }

        if params.origin.is_some() {
            self.origin = params.origin;
        }
        if params.destination.is_some() {
            self.destination = params.destination;
        }
        if params.posted_rate.is_some() {
            self.posted_rate = params.posted_rate;
        }
        if let Some(is_public) = params.is_public {
            self.is_public = is_public;
        }
        if let Some(requires_eld) = params.requires_eld {
            self.requires_eld = requires_eld;
        }
        if params.equipment_type.is_some() {
            self.equipment_type = params.equipment_type;
        }
        if params.weight_lbs.is_some() {
            self.weight_lbs = params.weight_lbs;
        }
        if params.notes.is_some() {
            self.notes = params.notes;
        }
        self.pickup_date = pickup_date;
        self.delivery_date = delivery_date;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn place(city: &str) -> Place {
        Place {
            address: "1 Dock Rd".into(),
            city: city.into(),
            region: "TX".into(),
            postal_code: None,
        }
    }

    fn complete_params() -> LoadParams {
        LoadParams {
            origin: Some(place("Houston")),
            destination: Some(place("Dallas")),
            pickup_date: NaiveDate::from_ymd_opt(2026, 3, 1),
            delivery_date: NaiveDate::from_ymd_opt(2026, 3, 2),
            posted_rate: Some(150_000),
            ..Default::default()
        }
    }

    #[test]
    fn full_lifecycle() {
        let now = Utc::now();
        let carrier_id = Uuid::new_v4();
        let mut load = Load::new(Uuid::new_v4(), complete_params(), now).unwrap();

        assert_eq!(load.status, Status::Draft);
        load.post(ActorRole::Shipper, now).unwrap();
        load.receive_bid(now).unwrap();
        assert_eq!(load.status, Status::Bidding);
        assert!(load.carrier_id.is_none());

        load.book(carrier_id, 140_000, now).unwrap();
        assert_eq!(load.carrier_id, Some(carrier_id));
        assert_eq!(load.booked_rate, Some(140_000));

        load.start_transit(ActorRole::Carrier, now).unwrap();
        load.deliver(ActorRole::Carrier, "pod-1".into(), now).unwrap();
        load.complete(ActorRole::Shipper, now).unwrap();

        assert_eq!(load.status, Status::Completed);
        assert!(load.completed_at.is_some());
    }

    #[test]
    fn posting_requires_complete_fields() {
        let now = Utc::now();
        let mut load = Load::new(
            Uuid::new_v4(),
            LoadParams {
                posted_rate: None,
                ..complete_params()
            },
            now,
        )
        .unwrap();

        let err = load.post(ActorRole::Shipper, now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(load.status, Status::Draft);
    }

    #[test]
    fn delivery_cannot_precede_pickup() {
        let params = LoadParams {
            pickup_date: NaiveDate::from_ymd_opt(2026, 3, 5),
            ..complete_params()
        };

        let err = Load::new(Uuid::new_v4(), params, Utc::now()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn rejected_transition_reports_states_and_role() {
        let now = Utc::now();
        let mut load = Load::new(Uuid::new_v4(), complete_params(), now).unwrap();

        let err = load.start_transit(ActorRole::Carrier, now).unwrap_err();
        let details = err.details.unwrap();

        assert_eq!(details["current"], "draft");
        assert_eq!(details["requested"], "in_transit");
        assert_eq!(details["role"], "carrier");
        assert_eq!(load.status, Status::Draft);
    }

    #[test]
    fn booking_twice_reports_already_booked() {
        let now = Utc::now();
        let mut load = Load::new(Uuid::new_v4(), complete_params(), now).unwrap();
        load.post(ActorRole::Shipper, now).unwrap();
        load.book(Uuid::new_v4(), 100, now).unwrap();

        let err = load.book(Uuid::new_v4(), 200, now).unwrap_err();
        assert!(err.is(&Error::load_already_booked()));
        assert_eq!(load.booked_rate, Some(100));
    }

    #[test]
    fn draft_and_cancelled_loads_are_not_biddable() {
        let now = Utc::now();
        let mut load = Load::new(Uuid::new_v4(), complete_params(), now).unwrap();

        assert!(load.receive_bid(now).unwrap_err().is(&Error::load_not_biddable("draft")));

        load.cancel(ActorRole::Shipper, now).unwrap();
        assert!(load.ensure_bookable().unwrap_err().is(&Error::load_not_biddable("cancelled")));
    }

    #[test]
    fn cancel_is_refused_once_booked() {
        let now = Utc::now();
        let mut load = Load::new(Uuid::new_v4(), complete_params(), now).unwrap();
        load.post(ActorRole::Shipper, now).unwrap();
        load.book(Uuid::new_v4(), 100, now).unwrap();

        let err = load.cancel(ActorRole::Shipper, now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        load.cancel_unfunded(now).unwrap();
        assert_eq!(load.status, Status::Cancelled);
        assert!(load.carrier_id.is_some());
    }

    #[test]
    fn edits_stop_once_bidding_starts() {
        let now = Utc::now();
        let mut load = Load::new(Uuid::new_v4(), complete_params(), now).unwrap();
        load.post(ActorRole::Shipper, now).unwrap();

        load.update(
            LoadParams {
                posted_rate: Some(160_000),
                ..Default::default()
            },
            now,
        )
        .unwrap();
        assert_eq!(load.posted_rate, Some(160_000));

        load.receive_bid(now).unwrap();
        let err = load.update(LoadParams::default(), now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }
}
