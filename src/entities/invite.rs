use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TeamInvite {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub invite_token: String,
    pub seats_allocated: i32,
    pub seats_claimed: i32,
    pub status: Status,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Claimed,
    Expired,
    Revoked,
}

impl Status {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }
}

pub fn new_token() -> String {
    let mut buf = [0u8; 32];
    OsRng.fill_bytes(&mut buf);
    format!("inv_{}", URL_SAFE_NO_PAD.encode(buf))
}

impl TeamInvite {
    pub fn new(subscription_id: Uuid, seats_allocated: i32, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscription_id,
            invite_token: new_token(),
            seats_allocated,
            seats_claimed: 0,
            status: Status::Pending,
            expires_at: now + ttl,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == Status::Pending && self.expires_at > now
    }

    /// Seats this invite still holds back from the subscription's pool.
    pub fn outstanding(&self, now: DateTime<Utc>) -> i32 {
        if !self.is_active(now) {
            return 0;
        }

        self.seats_allocated - self.seats_claimed
    }

    #[tracing::instrument(skip(self), fields(invite_id = %self.id))]
    pub fn claim(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        match self.status {
            Status::Revoked => return Err(Error::invite_revoked()),
            Status::Expired => return Err(Error::invite_expired()),
            Status::Claimed => return Err(Error::invite_exhausted()),
            Status::Pending => (),
        }

        if self.expires_at <= now {
            return Err(Error::invite_expired());
        }

        if self.seats_claimed >= self.seats_allocated {
            return Err(Error::invite_exhausted());
        }

        self.seats_claimed += 1;
        if self.seats_claimed == self.seats_allocated {
            self.status = Status::Claimed;
        }
        self.updated_at = now;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(invite_id = %self.id))]
    pub fn revoke(&mut self, now: DateTime<Utc>) -> Result<(), Error> {
        if self.status != Status::Pending {
            return Err(Error::invite_not_pending(self.status.name()));
        }

        self.status = Status::Revoked;
        self.updated_at = now;
        Ok(())
    }

    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != Status::Pending || self.expires_at > now {
            return false;
        }

        self.status = Status::Expired;
        self.updated_at = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite(seats: i32) -> TeamInvite {
        TeamInvite::new(Uuid::new_v4(), seats, Duration::days(7), Utc::now())
    }

    #[test]
    fn tokens_are_unique_and_url_safe() {
        let a = new_token();
        let b = new_token();

        assert_ne!(a, b);
        assert!(a.starts_with("inv_"));
        assert!(a[4..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn claims_until_exhausted() {
        let now = Utc::now();
        let mut invite = invite(2);

        invite.claim(now).unwrap();
        assert_eq!(invite.status, Status::Pending);
        assert_eq!(invite.outstanding(now), 1);

        invite.claim(now).unwrap();
        assert_eq!(invite.status, Status::Claimed);
        assert_eq!(invite.outstanding(now), 0);

        assert!(invite.claim(now).unwrap_err().is(&Error::invite_exhausted()));
        assert_eq!(invite.seats_claimed, 2);
    }

    #[test]
    fn expired_and_revoked_invites_refuse_claims() {
        let now = Utc::now();

        let mut expired = invite(1);
        let later = now + Duration::days(8);
        assert!(expired.claim(later).unwrap_err().is(&Error::invite_expired()));
        assert_eq!(expired.outstanding(later), 0);

        let mut revoked = invite(1);
        revoked.revoke(now).unwrap();
        assert!(revoked.claim(now).unwrap_err().is(&Error::invite_revoked()));
        assert_eq!(revoked.outstanding(now), 0);
    }

    #[test]
    fn revoke_only_while_pending() {
        let now = Utc::now();
        let mut invite = invite(1);
        invite.claim(now).unwrap();

        assert!(invite.revoke(now).is_err());
        assert_eq!(invite.status, Status::Claimed);
    }

    #[test]
    fn expiry_is_idempotent() {
        let now = Utc::now();
        let mut invite = TeamInvite::new(Uuid::new_v4(), 3, Duration::days(7), now);

        assert!(!invite.expire(now));
        let later = now + Duration::days(7);
        assert!(invite.expire(later));
        assert!(!invite.expire(later));
        assert_eq!(invite.status, Status::Expired);
    }
}
