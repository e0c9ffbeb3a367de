use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{
    Bid, BillingCycle, Load, LoadParams, LoadStatus, Payment, Profile, Subscription, TeamInvite,
};
use crate::error::Error;

/// Everything a successful bid acceptance commits together.
#[derive(Clone, Debug, Serialize)]
pub struct Booking {
    pub load: Load,
    pub bid: Bid,
    pub payment: Payment,
}

#[async_trait]
pub trait LoadAPI {
    async fn create_load(&self, user: User, params: LoadParams) -> Result<Load, Error>;
    async fn find_load(&self, user: User, id: Uuid) -> Result<Load, Error>;
    async fn update_load(&self, user: User, id: Uuid, params: LoadParams) -> Result<Load, Error>;
    async fn post_load(&self, user: User, id: Uuid) -> Result<Load, Error>;
    async fn cancel_load(&self, user: User, id: Uuid) -> Result<Load, Error>;
    async fn delete_load(&self, user: User, id: Uuid) -> Result<(), Error>;
    async fn advance_load_status(
        &self,
        user: User,
        id: Uuid,
        target: LoadStatus,
        proof_of_delivery: Option<String>,
    ) -> Result<Load, Error>;
}

#[async_trait]
pub trait BidAPI {
    async fn submit_bid(
        &self,
        user: User,
        load_id: Uuid,
        amount: i64,
        tracking_url: Option<String>,
    ) -> Result<Bid, Error>;
    async fn accept_bid(&self, user: User, load_id: Uuid, bid_id: Uuid) -> Result<Booking, Error>;
    async fn counter_bid(&self, user: User, bid_id: Uuid, counter_amount: i64) -> Result<Bid, Error>;
    async fn respond_to_counter(&self, user: User, bid_id: Uuid, accept: bool) -> Result<Bid, Error>;
    async fn find_bid(&self, user: User, bid_id: Uuid) -> Result<Bid, Error>;
    async fn list_bids(&self, user: User, load_id: Uuid) -> Result<Vec<Bid>, Error>;
}

#[async_trait]
pub trait PaymentAPI {
    async fn find_payment(&self, user: User, id: Uuid) -> Result<Payment, Error>;
    async fn open_escrow(
        &self,
        user: User,
        id: Uuid,
        external_charge_ref: String,
    ) -> Result<Payment, Error>;
    async fn release(&self, user: User, id: Uuid, reason: String) -> Result<Payment, Error>;
    async fn refund(&self, user: User, id: Uuid, reason: String) -> Result<Payment, Error>;
    async fn flag_dispute(&self, user: User, id: Uuid, dispute_reason: String) -> Result<Payment, Error>;
    async fn confirm_settlement(&self, user: User, id: Uuid) -> Result<Payment, Error>;
    async fn mark_failed(&self, user: User, id: Uuid, reason: String) -> Result<Payment, Error>;
}

#[async_trait]
pub trait DisputeAPI {
    async fn resolve_dispute(
        &self,
        user: User,
        load_id: Uuid,
        release_to_carrier: bool,
        reason: String,
    ) -> Result<Payment, Error>;
}

#[async_trait]
pub trait SeatAPI {
    async fn create_subscription(
        &self,
        user: User,
        plan_type: String,
        billing_cycle: BillingCycle,
        seats: i32,
    ) -> Result<Subscription, Error>;
    async fn find_subscription(&self, user: User, id: Uuid) -> Result<Subscription, Error>;
    async fn create_invite(
        &self,
        user: User,
        subscription_id: Uuid,
        seats_to_allocate: i32,
    ) -> Result<TeamInvite, Error>;
    async fn list_invites(&self, user: User, subscription_id: Uuid) -> Result<Vec<TeamInvite>, Error>;
    async fn claim_invite(&self, user: User, token: String) -> Result<Profile, Error>;
    async fn revoke_invite(&self, user: User, invite_id: Uuid) -> Result<TeamInvite, Error>;
    async fn remove_team_member(
        &self,
        user: User,
        subscription_id: Uuid,
        member_id: Uuid,
    ) -> Result<Subscription, Error>;
}

/// Time-driven transitions. Each is a conditional update, safe to run concurrently
/// with live requests and with itself.
#[async_trait]
pub trait SweepAPI {
    async fn expire_bids(&self, user: User, now: DateTime<Utc>) -> Result<u64, Error>;
    async fn expire_invites(&self, user: User, now: DateTime<Utc>) -> Result<u64, Error>;
    async fn auto_release_payments(&self, user: User, now: DateTime<Utc>) -> Result<u64, Error>;
}

pub trait API: LoadAPI + BidAPI + PaymentAPI + DisputeAPI + SeatAPI + SweepAPI {}

pub type DynAPI = Arc<dyn API + Send + Sync>;
