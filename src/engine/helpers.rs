use super::Database;

use chrono::{DateTime, Utc};
use sqlx::{types::Json, Executor, Row, Transaction};
use uuid::Uuid;

use crate::{
    entities::{Bid, Load, Payment, Profile, Subscription, TeamInvite},
    error::Error,
};

// loads

#[tracing::instrument(skip(tx))]
pub async fn fetch_load_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Load, Error> {
    let Json(load): Json<Load> = tx
        .fetch_optional(sqlx::query("SELECT data FROM loads WHERE id = $1 FOR UPDATE").bind(id))
        .await?
        .ok_or_else(|| Error::not_found("load"))?
        .try_get("data")?;

    Ok(load)
}

#[tracing::instrument(skip(tx, load), fields(load_id = %load.id))]
pub async fn insert_load(tx: &mut Transaction<'_, Database>, load: &Load) -> Result<(), Error> {
    tx.execute(
        sqlx::query(
            "INSERT INTO loads (id, shipper_id, status, delivered_at, data) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&load.id)
        .bind(&load.shipper_id)
        .bind(load.status.name())
        .bind(load.delivered_at)
        .bind(Json(load)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx, load), fields(load_id = %load.id))]
pub async fn update_load(tx: &mut Transaction<'_, Database>, load: &Load) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE loads SET status = $2, delivered_at = $3, data = $4 WHERE id = $1")
            .bind(&load.id)
            .bind(load.status.name())
            .bind(load.delivered_at)
            .bind(Json(load)),
    )
    .await?;

    Ok(())
}

// bids

#[tracing::instrument(skip(tx))]
pub async fn fetch_bid_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Bid, Error> {
    let Json(bid): Json<Bid> = tx
        .fetch_optional(sqlx::query("SELECT data FROM bids WHERE id = $1 FOR UPDATE").bind(id))
        .await?
        .ok_or_else(Error::bid_not_found)?
        .try_get("data")?;

    Ok(bid)
}

/// Locks every pending or countered bid on a load. Callers must already hold the load lock.
#[tracing::instrument(skip(tx))]
pub async fn fetch_open_bids_for_update(
    tx: &mut Transaction<'_, Database>,
    load_id: &Uuid,
) -> Result<Vec<Bid>, Error> {
    let rows = tx
        .fetch_all(
            sqlx::query(
                "SELECT data FROM bids WHERE load_id = $1 AND status IN ('pending', 'countered') ORDER BY id FOR UPDATE",
            )
            .bind(load_id),
        )
        .await?;

    let mut bids = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let Json(bid): Json<Bid> = row.try_get("data")?;
        bids.push(bid);
    }

    Ok(bids)
}

/// Locks the carrier's pending or countered bids on a load. Callers must already hold the load lock.
#[tracing::instrument(skip(tx))]
pub async fn fetch_carrier_open_bids_for_update(
    tx: &mut Transaction<'_, Database>,
    load_id: &Uuid,
    carrier_id: &Uuid,
) -> Result<Vec<Bid>, Error> {
    let rows = tx
        .fetch_all(
            sqlx::query(
                "SELECT data FROM bids WHERE load_id = $1 AND carrier_id = $2 AND status IN ('pending', 'countered') FOR UPDATE",
            )
            .bind(load_id)
            .bind(carrier_id),
        )
        .await?;

    let mut bids = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let Json(bid): Json<Bid> = row.try_get("data")?;
        bids.push(bid);
    }

    Ok(bids)
}

#[tracing::instrument(skip(tx))]
pub async fn has_accepted_bid(
    tx: &mut Transaction<'_, Database>,
    load_id: &Uuid,
) -> Result<bool, Error> {
    let maybe_row = tx
        .fetch_optional(
            sqlx::query("SELECT id FROM bids WHERE load_id = $1 AND status = 'accepted'")
                .bind(load_id),
        )
        .await?;

    Ok(maybe_row.is_some())
}

#[tracing::instrument(skip(tx, bid), fields(bid_id = %bid.id))]
pub async fn insert_bid(tx: &mut Transaction<'_, Database>, bid: &Bid) -> Result<(), Error> {
    tx.execute(
        sqlx::query(
            "INSERT INTO bids (id, load_id, carrier_id, status, expires_at, data) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&bid.id)
        .bind(&bid.load_id)
        .bind(&bid.carrier_id)
        .bind(bid.status.name())
        .bind(bid.expires_at)
        .bind(Json(bid)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx, bid), fields(bid_id = %bid.id))]
pub async fn update_bid(tx: &mut Transaction<'_, Database>, bid: &Bid) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE bids SET status = $2, expires_at = $3, data = $4 WHERE id = $1")
            .bind(&bid.id)
            .bind(bid.status.name())
            .bind(bid.expires_at)
            .bind(Json(bid)),
    )
    .await?;

    Ok(())
}

// payments

#[tracing::instrument(skip(tx))]
pub async fn fetch_payment_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Payment, Error> {
    let Json(payment): Json<Payment> = tx
        .fetch_optional(
            sqlx::query("SELECT data FROM payments WHERE id = $1 FOR UPDATE").bind(id),
        )
        .await?
        .ok_or_else(|| Error::not_found("payment"))?
        .try_get("data")?;

    Ok(payment)
}

#[tracing::instrument(skip(tx))]
pub async fn fetch_load_payment_for_update(
    tx: &mut Transaction<'_, Database>,
    load_id: &Uuid,
) -> Result<Option<Payment>, Error> {
    let maybe_row = tx
        .fetch_optional(
            sqlx::query("SELECT data FROM payments WHERE load_id = $1 FOR UPDATE").bind(load_id),
        )
        .await?;

    match maybe_row {
        Some(row) => {
            let Json(payment): Json<Payment> = row.try_get("data")?;
            Ok(Some(payment))
        }
        None => Ok(None),
    }
}

/// Locks a payment and its load, load first. A payment never changes loads, so the
/// lookup of `load_id` takes no lock.
#[tracing::instrument(skip(tx))]
pub async fn fetch_payment_with_load_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<(Load, Payment), Error> {
    let load_id: Uuid = tx
        .fetch_optional(sqlx::query("SELECT load_id FROM payments WHERE id = $1").bind(id))
        .await?
        .ok_or_else(|| Error::not_found("payment"))?
        .try_get("load_id")?;

    let load = fetch_load_for_update(tx, &load_id).await?;
    let payment = fetch_payment_for_update(tx, id).await?;

    Ok((load, payment))
}

#[tracing::instrument(skip(tx, payment), fields(payment_id = %payment.id))]
pub async fn insert_payment(
    tx: &mut Transaction<'_, Database>,
    payment: &Payment,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query("INSERT INTO payments (id, load_id, status, data) VALUES ($1, $2, $3, $4)")
            .bind(&payment.id)
            .bind(&payment.load_id)
            .bind(payment.status.name())
            .bind(Json(payment)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx, payment), fields(payment_id = %payment.id))]
pub async fn update_payment(
    tx: &mut Transaction<'_, Database>,
    payment: &Payment,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE payments SET status = $2, data = $3 WHERE id = $1")
            .bind(&payment.id)
            .bind(payment.status.name())
            .bind(Json(payment)),
    )
    .await?;

    Ok(())
}

// seats

#[tracing::instrument(skip(tx))]
pub async fn fetch_subscription_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Subscription, Error> {
    let Json(subscription): Json<Subscription> = tx
        .fetch_optional(
            sqlx::query("SELECT data FROM subscriptions WHERE id = $1 FOR UPDATE").bind(id),
        )
        .await?
        .ok_or_else(|| Error::not_found("subscription"))?
        .try_get("data")?;

    Ok(subscription)
}

#[tracing::instrument(skip(tx, subscription), fields(subscription_id = %subscription.id))]
pub async fn insert_subscription(
    tx: &mut Transaction<'_, Database>,
    subscription: &Subscription,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query("INSERT INTO subscriptions (id, user_id, status, data) VALUES ($1, $2, $3, $4)")
            .bind(&subscription.id)
            .bind(&subscription.user_id)
            .bind(subscription.status.name())
            .bind(Json(subscription)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx, subscription), fields(subscription_id = %subscription.id))]
pub async fn update_subscription(
    tx: &mut Transaction<'_, Database>,
    subscription: &Subscription,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE subscriptions SET status = $2, data = $3 WHERE id = $1")
            .bind(&subscription.id)
            .bind(subscription.status.name())
            .bind(Json(subscription)),
    )
    .await?;

    Ok(())
}

/// Locks an invite. Callers must already hold its subscription's lock.
#[tracing::instrument(skip(tx))]
pub async fn fetch_invite_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<TeamInvite, Error> {
    let Json(invite): Json<TeamInvite> = tx
        .fetch_optional(
            sqlx::query("SELECT data FROM team_invites WHERE id = $1 FOR UPDATE").bind(id),
        )
        .await?
        .ok_or_else(Error::invite_not_found)?
        .try_get("data")?;

    Ok(invite)
}

/// Seats held back by pending, unexpired invites. Only meaningful while the
/// subscription row is locked, since every invite mutation takes that lock first.
#[tracing::instrument(skip(tx))]
pub async fn outstanding_reservations(
    tx: &mut Transaction<'_, Database>,
    subscription_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<i32, Error> {
    let rows = tx
        .fetch_all(
            sqlx::query(
                "SELECT data FROM team_invites WHERE subscription_id = $1 AND status = 'pending' AND expires_at > $2",
            )
            .bind(subscription_id)
            .bind(now),
        )
        .await?;

    let mut reserved = 0;
    for row in rows.iter() {
        let Json(invite): Json<TeamInvite> = row.try_get("data")?;
        reserved += invite.outstanding(now);
    }

    Ok(reserved)
}

#[tracing::instrument(skip(tx, invite), fields(invite_id = %invite.id))]
pub async fn insert_invite(
    tx: &mut Transaction<'_, Database>,
    invite: &TeamInvite,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query(
            "INSERT INTO team_invites (id, subscription_id, invite_token, status, expires_at, data) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&invite.id)
        .bind(&invite.subscription_id)
        .bind(&invite.invite_token)
        .bind(invite.status.name())
        .bind(invite.expires_at)
        .bind(Json(invite)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx, invite), fields(invite_id = %invite.id))]
pub async fn update_invite(
    tx: &mut Transaction<'_, Database>,
    invite: &TeamInvite,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE team_invites SET status = $2, data = $3 WHERE id = $1")
            .bind(&invite.id)
            .bind(invite.status.name())
            .bind(Json(invite)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx))]
pub async fn fetch_profile_for_update(
    tx: &mut Transaction<'_, Database>,
    user_id: &Uuid,
) -> Result<Option<Profile>, Error> {
    let maybe_row = tx
        .fetch_optional(
            sqlx::query("SELECT data FROM profiles WHERE user_id = $1 FOR UPDATE").bind(user_id),
        )
        .await?;

    match maybe_row {
        Some(row) => {
            let Json(profile): Json<Profile> = row.try_get("data")?;
            Ok(Some(profile))
        }
        None => Ok(None),
    }
}

/// Inserts a team profile. A user joining two teams at once finds the other
/// profile here: the loser waits on the winner's insert and gets `AlreadyMember`.
#[tracing::instrument(skip(tx, profile), fields(user_id = %profile.user_id))]
pub async fn insert_profile(
    tx: &mut Transaction<'_, Database>,
    profile: &Profile,
) -> Result<(), Error> {
    let result = tx
        .execute(
            sqlx::query(
                "INSERT INTO profiles (user_id, subscription_id, data) VALUES ($1, $2, $3) ON CONFLICT (user_id) DO NOTHING",
            )
            .bind(&profile.user_id)
            .bind(&profile.subscription_id)
            .bind(Json(profile)),
        )
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::already_member());
    }

    Ok(())
}

#[tracing::instrument(skip(tx))]
pub async fn delete_profile(tx: &mut Transaction<'_, Database>, user_id: &Uuid) -> Result<(), Error> {
    tx.execute(sqlx::query("DELETE FROM profiles WHERE user_id = $1").bind(user_id))
        .await?;

    Ok(())
}
