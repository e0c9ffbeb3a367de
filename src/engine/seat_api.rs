use super::helpers::{
    delete_profile, fetch_invite_for_update, fetch_profile_for_update,
    fetch_subscription_for_update, insert_invite, insert_profile, insert_subscription,
    outstanding_reservations, update_invite, update_subscription,
};
use super::Engine;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{types::Json, Acquire, Executor, Row};
use uuid::Uuid;

use crate::{
    api::SeatAPI,
    auth::User,
    entities::{BillingCycle, Profile, Subscription, TeamInvite},
    error::Error,
    events::Event,
};

impl Engine {
    async fn fetch_subscription(&self, id: Uuid) -> Result<Subscription, Error> {
        let mut conn = self.pool.acquire().await?;

        let Json(subscription): Json<Subscription> = conn
            .fetch_optional(sqlx::query("SELECT data FROM subscriptions WHERE id = $1").bind(&id))
            .await?
            .ok_or_else(|| Error::not_found("subscription"))?
            .try_get("data")?;

        Ok(subscription)
    }

    fn authorize_owner(&self, user: &User, subscription: &Subscription) -> Result<(), Error> {
        if !self.is_allowed(user.clone(), "manage", subscription.clone())? {
            return Err(Error::not_owner());
        }

        Ok(())
    }
}

#[async_trait]
impl SeatAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn create_subscription(
        &self,
        user: User,
        plan_type: String,
        billing_cycle: BillingCycle,
        seats: i32,
    ) -> Result<Subscription, Error> {
        let now = Utc::now();
        let subscription = Subscription::new(user.id, plan_type, billing_cycle, seats, now)?;
        let profile = Profile::owner(user.id, subscription.id, now);

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        if fetch_profile_for_update(&mut tx, &user.id).await?.is_some() {
            return Err(Error::already_member());
        }

        insert_subscription(&mut tx, &subscription).await?;
        insert_profile(&mut tx, &profile).await?;
        tx.commit().await?;

        tracing::info!(subscription_id = %subscription.id, seats, "subscription created");
        self.publish(Event::SubscriptionCreated {
            subscription_id: subscription.id,
        });

        Ok(subscription)
    }

    #[tracing::instrument(skip(self))]
    async fn find_subscription(&self, user: User, id: Uuid) -> Result<Subscription, Error> {
        let subscription = self.fetch_subscription(id).await?;

        self.authorize(user, "read", subscription.clone())?;

        Ok(subscription)
    }

    #[tracing::instrument(skip(self))]
    async fn create_invite(
        &self,
        user: User,
        subscription_id: Uuid,
        seats_to_allocate: i32,
    ) -> Result<TeamInvite, Error> {
        let now = Utc::now();

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        // every change to seats or reservations takes the subscription lock first
        let subscription = fetch_subscription_for_update(&mut tx, &subscription_id).await?;
        self.authorize_owner(&user, &subscription)?;

        let reserved = outstanding_reservations(&mut tx, &subscription_id, now).await?;
        subscription.ensure_capacity(seats_to_allocate, reserved)?;

        let invite = TeamInvite::new(subscription_id, seats_to_allocate, self.policy.invite_ttl, now);

        insert_invite(&mut tx, &invite).await?;
        tx.commit().await?;

        tracing::info!(
            invite_id = %invite.id,
            seats_to_allocate,
            reserved,
            "invite created"
        );
        self.publish(Event::InviteCreated {
            subscription_id,
            invite_id: invite.id,
        });

        Ok(invite)
    }

    #[tracing::instrument(skip(self))]
    async fn list_invites(&self, user: User, subscription_id: Uuid) -> Result<Vec<TeamInvite>, Error> {
        let subscription = self.fetch_subscription(subscription_id).await?;
        self.authorize(user, "read", subscription)?;

        let mut conn = self.pool.acquire().await?;
        let rows = conn
            .fetch_all(
                sqlx::query(
                    "SELECT data FROM team_invites WHERE subscription_id = $1 ORDER BY (data->>'created_at') DESC",
                )
                .bind(&subscription_id),
            )
            .await?;

        let mut invites = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let Json(invite): Json<TeamInvite> = row.try_get("data")?;
            invites.push(invite);
        }

        Ok(invites)
    }

    #[tracing::instrument(skip(self, token))]
    async fn claim_invite(&self, user: User, token: String) -> Result<Profile, Error> {
        let now = Utc::now();

        let mut conn = self.pool.acquire().await?;

        tracing::info!("resolving invite token without lock");
        let row = conn
            .fetch_optional(
                sqlx::query("SELECT id, subscription_id FROM team_invites WHERE invite_token = $1")
                    .bind(&token),
            )
            .await?
            .ok_or_else(Error::invite_not_found)?;
        let invite_id: Uuid = row.try_get("id")?;
        let subscription_id: Uuid = row.try_get("subscription_id")?;

        let mut tx = conn.begin().await?;

        let mut subscription = fetch_subscription_for_update(&mut tx, &subscription_id).await?;
        let mut invite = fetch_invite_for_update(&mut tx, &invite_id).await?;

        invite.claim(now)?;

        if fetch_profile_for_update(&mut tx, &user.id).await?.is_some() {
            return Err(Error::already_member());
        }

        subscription.occupy_seat()?;
        let profile = Profile::member(user.id, subscription_id, invite_id, now);

        update_invite(&mut tx, &invite).await?;
        update_subscription(&mut tx, &subscription).await?;
        insert_profile(&mut tx, &profile).await?;
        tx.commit().await?;

        tracing::info!(
            invite_id = %invite_id,
            seats_claimed = invite.seats_claimed,
            seats_used = subscription.seats_used,
            "invite claimed"
        );
        self.publish(Event::InviteClaimed {
            subscription_id,
            invite_id,
            user_id: user.id,
        });

        Ok(profile)
    }

    #[tracing::instrument(skip(self))]
    async fn revoke_invite(&self, user: User, invite_id: Uuid) -> Result<TeamInvite, Error> {
        let mut conn = self.pool.acquire().await?;

        tracing::info!("fetching invite without lock");
        let subscription_id: Uuid = conn
            .fetch_optional(
                sqlx::query("SELECT subscription_id FROM team_invites WHERE id = $1")
                    .bind(&invite_id),
            )
            .await?
            .ok_or_else(Error::invite_not_found)?
            .try_get("subscription_id")?;

        let mut tx = conn.begin().await?;

        let subscription = fetch_subscription_for_update(&mut tx, &subscription_id).await?;
        self.authorize_owner(&user, &subscription)?;

        let mut invite = fetch_invite_for_update(&mut tx, &invite_id).await?;
        invite.revoke(Utc::now())?;

        update_invite(&mut tx, &invite).await?;
        tx.commit().await?;

        tracing::info!(
            returned = invite.seats_allocated - invite.seats_claimed,
            "invite revoked, unclaimed seats returned"
        );
        self.publish(Event::InviteRevoked {
            subscription_id,
            invite_id,
        });

        Ok(invite)
    }

    #[tracing::instrument(skip(self))]
    async fn remove_team_member(
        &self,
        user: User,
        subscription_id: Uuid,
        member_id: Uuid,
    ) -> Result<Subscription, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut subscription = fetch_subscription_for_update(&mut tx, &subscription_id).await?;
        self.authorize_owner(&user, &subscription)?;

        if member_id == subscription.user_id {
            return Err(Error::validation_error(
                "member_id",
                "the subscription owner cannot be removed",
            ));
        }

        match fetch_profile_for_update(&mut tx, &member_id).await? {
            Some(profile) if profile.subscription_id == subscription_id => (),
            _ => return Err(Error::member_not_found()),
        }

        delete_profile(&mut tx, &member_id).await?;
        subscription.vacate_seat()?;

        update_subscription(&mut tx, &subscription).await?;
        tx.commit().await?;

        self.publish(Event::TeamMemberRemoved {
            subscription_id,
            user_id: member_id,
        });

        Ok(subscription)
    }
}
