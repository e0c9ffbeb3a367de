use chrono::{DateTime, Duration, Utc};
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

#[derive(Clone, Debug, Serialize, Deserialize, PolarClass)]
pub struct Bid {
    #[polar(attribute)]
    pub id: Uuid,
    #[polar(attribute)]
    pub load_id: Uuid,
    #[polar(attribute)]
    pub carrier_id: Uuid,
    pub amount: i64,
    pub counter_amount: Option<i64>,
    pub status: Status,
    pub expires_at: DateTime<Utc>,
    pub tracking_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Accepted,
    Rejected,
    Countered,
    Expired,
}

impl Status {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Countered => "countered",
            Self::Expired => "expired",
        }
    }
}

impl Bid {
    pub fn new(
        load_id: Uuid,
        carrier_id: Uuid,
        amount: i64,
        tracking_url: Option<String>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, Error> {
        if amount <= 0 {
            return Err(Error::validation_error("amount", "must be positive"));
        }

        if let Some(url) = &tracking_url {
            match reqwest::Url::parse(url) {
                Ok(parsed) if parsed.scheme() == "https" || parsed.scheme() == "http" => (),
                _ => {
                    return Err(Error::validation_error(
                        "tracking_url",
                        "must be an http(s) url",
                    ))
                }
            }
        }

        Ok(Self {
            id: Uuid::new_v4(),
            load_id,
            carrier_id,
            amount,
            counter_amount: None,
            status: Status::Pending,
            expires_at: now + ttl,
            tracking_url,
            created_at: now,
            updated_at: now,
        })
    }

    /// Pending or countered: the bid can still turn into a booking.
    pub fn is_open(&self) -> bool {
        matches!(self.status, Status::Pending | Status::Countered)
    }

    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    #[tracing::instrument(skip(self), fields(bid_id = %self.id))]
    pub fn accept(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        if self.status != Status::Pending {
            return Err(Error::bid_not_pending(self.status.name()));
        }

        if self.is_lapsed(now) {
            return Err(Error::bid_not_pending(Status::Expired.name()));
        }

        self.status = Status::Accepted;
        self.updated_at = now;
        Ok(())
    }

    /// Rejects an open bid; closed bids are left as they are.
    pub fn reject(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_open() {
            return false;
        }

        self.status = Status::Rejected;
        self.updated_at = now;
        true
    }

    /// Expires a pending bid whose deadline has passed; anything else is untouched.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != Status::Pending || !self.is_lapsed(now) {
            return false;
        }

        self.status = Status::Expired;
        self.updated_at = now;
        true
    }

    #[tracing::instrument(skip(self), fields(bid_id = %self.id))]
    pub fn counter(&mut self, counter_amount: i64, now: DateTime<Utc>) -> Result<(), Error> {
        if counter_amount <= 0 {
            return Err(Error::validation_error("counter_amount", "must be positive"));
        }

        if self.status != Status::Pending || self.is_lapsed(now) {
            return Err(Error::bid_not_pending(self.status.name()));
        }

        self.status = Status::Countered;
        self.counter_amount = Some(counter_amount);
        self.updated_at = now;
        Ok(())
    }

    /// The carrier's answer to a counter offer. Taking it reprices the bid and puts it
    /// back in front of the shipper with a fresh expiry.
    #[tracing::instrument(skip(self), fields(bid_id = %self.id))]
    pub fn respond_to_counter(
        &mut self,
        accept: bool,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let counter_amount = match (self.status, self.counter_amount) {
            (Status::Countered, Some(amount)) => amount,
            _ => return Err(Error::bid_not_countered(self.status.name())),
        };

        if accept {
            self.amount = counter_amount;
            self.status = Status::Pending;
            self.expires_at = now + ttl;
        } else {
            self.status = Status::Rejected;
        }

        self.counter_amount = None;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(now: DateTime<Utc>) -> Bid {
        Bid::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            50_000,
            Some("https://track.example.com/abc".into()),
            Duration::hours(72),
            now,
        )
        .unwrap()
    }

    #[test]
    fn new_bid_is_pending_with_expiry() {
        let now = Utc::now();
        let bid = bid(now);

        assert_eq!(bid.status, Status::Pending);
        assert_eq!(bid.expires_at, now + Duration::hours(72));
    }

    #[test]
    fn rejects_bad_amount_and_tracking_url() {
        let now = Utc::now();
        let ttl = Duration::hours(1);

        assert!(Bid::new(Uuid::new_v4(), Uuid::new_v4(), 0, None, ttl, now).is_err());
        assert!(Bid::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            10,
            Some("ftp://nope".into()),
            ttl,
            now
        )
        .is_err());
    }

    #[test]
    fn accept_only_from_pending() {
        let now = Utc::now();
        let mut bid = bid(now);

        bid.accept(now).unwrap();
        let err = bid.accept(now).unwrap_err();

        assert!(err.is(&Error::bid_not_pending("accepted")));
        assert_eq!(bid.status, Status::Accepted);
    }

    #[test]
    fn lapsed_bid_cannot_be_accepted() {
        let now = Utc::now();
        let mut bid = bid(now);

        let later = now + Duration::hours(73);
        assert!(bid.accept(later).is_err());
        assert_eq!(bid.status, Status::Pending);
    }

    #[test]
    fn expiry_never_touches_settled_bids() {
        let now = Utc::now();
        let later = now + Duration::hours(100);

        let mut accepted = bid(now);
        accepted.accept(now).unwrap();
        assert!(!accepted.expire(later));
        assert_eq!(accepted.status, Status::Accepted);

        let mut rejected = bid(now);
        assert!(rejected.reject(now));
        assert!(!rejected.expire(later));
        assert_eq!(rejected.status, Status::Rejected);

        let mut pending = bid(now);
        assert!(!pending.expire(now));
        assert!(pending.expire(later));
        assert!(!pending.expire(later));
        assert_eq!(pending.status, Status::Expired);
    }

    #[test]
    fn counter_offer_round_trip() {
        let now = Utc::now();
        let mut bid = bid(now);

        bid.counter(45_000, now).unwrap();
        assert_eq!(bid.status, Status::Countered);
        assert!(bid.accept(now).is_err());

        let later = now + Duration::hours(10);
        bid.respond_to_counter(true, Duration::hours(72), later).unwrap();
        assert_eq!(bid.status, Status::Pending);
        assert_eq!(bid.amount, 45_000);
        assert_eq!(bid.expires_at, later + Duration::hours(72));

        let err = bid.respond_to_counter(true, Duration::hours(72), later).unwrap_err();
        assert!(err.is(&Error::bid_not_countered("pending")));
    }

    #[test]
    fn declined_counter_rejects_bid() {
        let now = Utc::now();
        let mut bid = bid(now);

        bid.counter(45_000, now).unwrap();
        bid.respond_to_counter(false, Duration::hours(72), now).unwrap();

        assert_eq!(bid.status, Status::Rejected);
        assert_eq!(bid.amount, 50_000);
    }
}
