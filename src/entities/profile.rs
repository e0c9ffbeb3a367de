use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub claimed_via_invite: Option<Uuid>,
    pub is_owner: bool,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn owner(user_id: Uuid, subscription_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            subscription_id,
            claimed_via_invite: None,
            is_owner: true,
            created_at: now,
        }
    }

    pub fn member(user_id: Uuid, subscription_id: Uuid, invite_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            subscription_id,
            claimed_via_invite: Some(invite_id),
            is_owner: false,
            created_at: now,
        }
    }
}
