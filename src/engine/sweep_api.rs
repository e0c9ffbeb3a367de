use super::helpers::{fetch_load_payment_for_update, update_bid, update_invite, update_load, update_payment};
use super::Engine;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, Acquire, Executor, Row};
use uuid::Uuid;

use crate::{
    api::SweepAPI,
    auth::{Platform, User},
    entities::{ActorRole, Bid, Load, LoadStatus, PaymentStatus, TeamInvite},
    error::Error,
    events::Event,
};

#[async_trait]
impl SweepAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn expire_bids(&self, user: User, now: DateTime<Utc>) -> Result<u64, Error> {
        self.authorize(user, "run_sweeps", Platform::marketplace())?;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        // rows held by an in-flight acceptance are skipped and picked up next run
        let rows = tx
            .fetch_all(
                sqlx::query(
                    "SELECT data FROM bids WHERE status = 'pending' AND expires_at <= $1 FOR UPDATE SKIP LOCKED",
                )
                .bind(now),
            )
            .await?;

        let mut expired = 0;
        for row in rows.iter() {
            let Json(mut bid): Json<Bid> = row.try_get("data")?;

            if bid.expire(now) {
                update_bid(&mut tx, &bid).await?;
                expired += 1;
            }
        }

        tx.commit().await?;

        if expired > 0 {
            tracing::info!(expired, "pending bids expired");
            self.publish(Event::BidsExpired { count: expired });
        }

        Ok(expired)
    }

    #[tracing::instrument(skip(self))]
    async fn expire_invites(&self, user: User, now: DateTime<Utc>) -> Result<u64, Error> {
        self.authorize(user, "run_sweeps", Platform::marketplace())?;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let rows = tx
            .fetch_all(
                sqlx::query(
                    "SELECT data FROM team_invites WHERE status = 'pending' AND expires_at <= $1 FOR UPDATE SKIP LOCKED",
                )
                .bind(now),
            )
            .await?;

        let mut expired = 0;
        for row in rows.iter() {
            let Json(mut invite): Json<TeamInvite> = row.try_get("data")?;

            if invite.expire(now) {
                update_invite(&mut tx, &invite).await?;
                expired += 1;
            }
        }

        tx.commit().await?;

        if expired > 0 {
            tracing::info!(expired, "pending invites expired");
            self.publish(Event::InvitesExpired { count: expired });
        }

        Ok(expired)
    }

    #[tracing::instrument(skip(self))]
    async fn auto_release_payments(&self, user: User, now: DateTime<Utc>) -> Result<u64, Error> {
        self.authorize(user, "run_sweeps", Platform::marketplace())?;

        let cutoff = now - self.policy.auto_release_after;

        let mut conn = self.pool.acquire().await?;

        tracing::info!("fetching delivered loads past the approval window...");
        let candidates = conn
            .fetch_all(
                sqlx::query(
                    "SELECT l.id FROM loads l JOIN payments p ON p.load_id = l.id WHERE l.status = 'delivered' AND l.delivered_at <= $1 AND p.status IN ('held_in_escrow', 'released', 'completed')",
                )
                .bind(cutoff),
            )
            .await?;

        let mut released = 0;
        for candidate in candidates.iter() {
            let load_id: Uuid = candidate.try_get("id")?;

            // each load settles in its own transaction so one rail failure does not undo the rest
            let mut tx = conn.begin().await?;

            let maybe_result = tx
                .fetch_optional(
                    sqlx::query("SELECT data FROM loads WHERE id = $1 FOR UPDATE SKIP LOCKED")
                        .bind(&load_id),
                )
                .await?;

            let result = match maybe_result {
                Some(result) => result,
                None => {
                    tracing::info!(load_id = %load_id, "load is locked by a live request, moving on...");
                    continue;
                }
            };

            let Json(mut load): Json<Load> = result.try_get("data")?;

            let due = matches!(load.delivered_at, Some(delivered_at) if delivered_at <= cutoff);
            if load.status != LoadStatus::Delivered || !due {
                continue;
            }

            let mut payment = match fetch_load_payment_for_update(&mut tx, &load_id).await? {
                Some(payment) => payment,
                None => continue,
            };

            // funds a dispute ruling already paid out only need the load closed
            let held = match payment.status {
                PaymentStatus::HeldInEscrow => true,
                PaymentStatus::Released | PaymentStatus::Completed => false,
                _ => continue,
            };

            load.complete(ActorRole::Admin, now)?;

            if held {
                if let Err(err) = self
                    .transfer_to_carrier(&mut payment, "auto-released after delivery".into(), now)
                    .await
                {
                    tracing::warn!(load_id = %load_id, error = %err, "auto-release failed, will retry next run");
                    continue;
                }

                update_payment(&mut tx, &payment).await?;
            }

            update_load(&mut tx, &load).await?;
            tx.commit().await?;

            released += 1;
            self.publish(Event::LoadStatusChanged {
                load_id,
                status: load.status.name().to_string(),
            });
            if held {
                self.publish(Event::PaymentReleased {
                    payment_id: payment.id,
                });
            }
        }

        if released > 0 {
            tracing::info!(released, "escrowed payments auto-released");
        }

        Ok(released)
    }
}
