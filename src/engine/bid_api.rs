use super::helpers::{
    fetch_bid_for_update, fetch_carrier_open_bids_for_update, fetch_load_for_update,
    fetch_open_bids_for_update, insert_bid, insert_payment, update_bid, update_load,
};
use super::Engine;

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use sqlx::{types::Json, Acquire, Executor, Row};
use uuid::Uuid;

use crate::{
    api::{BidAPI, Booking},
    auth::User,
    entities::{Bid, Payment},
    error::Error,
    events::Event,
};

impl Engine {
    async fn fetch_bid(&self, id: Uuid) -> Result<Bid, Error> {
        let mut conn = self.pool.acquire().await?;

        let Json(bid): Json<Bid> = conn
            .fetch_optional(sqlx::query("SELECT data FROM bids WHERE id = $1").bind(&id))
            .await?
            .ok_or_else(Error::bid_not_found)?
            .try_get("data")?;

        Ok(bid)
    }
}

#[async_trait]
impl BidAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn submit_bid(
        &self,
        user: User,
        load_id: Uuid,
        amount: i64,
        tracking_url: Option<String>,
    ) -> Result<Bid, Error> {
        let now = Utc::now();

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut load = fetch_load_for_update(&mut tx, &load_id).await?;

        if !load.is_open_for_bids() {
            tracing::info!(status = load.status.name(), "load is not taking bids");
            return Err(Error::load_not_biddable(load.status.name()));
        }

        self.authorize(user.clone(), "submit_bid", load.clone())?;

        for mut open in fetch_carrier_open_bids_for_update(&mut tx, &load_id, &user.id).await? {
            // a lapsed bid the sweep has not reached yet does not block a new one
            if !open.expire(now) {
                return Err(Error::duplicate_bid());
            }

            update_bid(&mut tx, &open).await?;
        }

        let bid = Bid::new(load_id, user.id, amount, tracking_url, self.policy.bid_ttl, now)?;
        load.receive_bid(now)?;

        insert_bid(&mut tx, &bid).await?;
        update_load(&mut tx, &load).await?;
        tx.commit().await?;

        tracing::info!(bid_id = %bid.id, "bid submitted");
        self.publish(Event::BidSubmitted {
            load_id,
            bid_id: bid.id,
        });

        Ok(bid)
    }

    #[tracing::instrument(skip(self))]
    async fn accept_bid(&self, user: User, load_id: Uuid, bid_id: Uuid) -> Result<Booking, Error> {
        let now = Utc::now();

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        // the load lock serializes every acceptance on this load
        let mut load = fetch_load_for_update(&mut tx, &load_id).await?;

        if !self.is_allowed(user.clone(), "accept_bid", load.clone())? {
            return Err(Error::not_owner());
        }

        load.ensure_bookable()?;

        let mut bid = fetch_bid_for_update(&mut tx, &bid_id).await?;
        if bid.load_id != load_id {
            return Err(Error::bid_not_found());
        }

        bid.accept(now)?;

        let mut rejected = 0;
        for mut sibling in fetch_open_bids_for_update(&mut tx, &load_id).await? {
            if sibling.id == bid.id {
                continue;
            }

            if sibling.reject(now) {
                update_bid(&mut tx, &sibling).await?;
                rejected += 1;
            }
        }

        load.book(bid.carrier_id, bid.amount, now)?;
        let payment = Payment::new(&load, &bid, now);

        update_bid(&mut tx, &bid).await?;
        update_load(&mut tx, &load).await?;
        insert_payment(&mut tx, &payment).await?;
        tx.commit().await?;

        tracing::info!(
            carrier_id = %bid.carrier_id,
            amount = bid.amount,
            rejected,
            "bid accepted, load booked"
        );
        self.publish(Event::BidAccepted {
            load_id,
            bid_id,
            payment_id: payment.id,
        });

        Ok(Booking { load, bid, payment })
    }

    #[tracing::instrument(skip(self))]
    async fn counter_bid(&self, user: User, bid_id: Uuid, counter_amount: i64) -> Result<Bid, Error> {
        tracing::info!("fetching bid without lock");
        let load_id = self.fetch_bid(bid_id).await?.load_id;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let load = fetch_load_for_update(&mut tx, &load_id).await?;

        if !self.is_allowed(user.clone(), "counter_bid", load.clone())? {
            return Err(Error::not_owner());
        }

        if !load.is_open_for_bids() {
            return Err(Error::load_not_biddable(load.status.name()));
        }

        let mut bid = fetch_bid_for_update(&mut tx, &bid_id).await?;
        bid.counter(counter_amount, Utc::now())?;

        update_bid(&mut tx, &bid).await?;
        tx.commit().await?;

        self.publish(Event::BidCountered { load_id, bid_id });

        Ok(bid)
    }

    #[tracing::instrument(skip(self))]
    async fn respond_to_counter(&self, user: User, bid_id: Uuid, accept: bool) -> Result<Bid, Error> {
        tracing::info!("fetching bid without lock");
        let load_id = self.fetch_bid(bid_id).await?.load_id;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let load = fetch_load_for_update(&mut tx, &load_id).await?;
        let mut bid = fetch_bid_for_update(&mut tx, &bid_id).await?;

        self.authorize(user, "respond", bid.clone())?;

        if !load.is_open_for_bids() {
            return Err(Error::load_not_biddable(load.status.name()));
        }

        bid.respond_to_counter(accept, self.policy.bid_ttl, Utc::now())?;

        update_bid(&mut tx, &bid).await?;
        tx.commit().await?;

        self.publish(Event::CounterAnswered {
            load_id,
            bid_id,
            accepted: accept,
        });

        Ok(bid)
    }

    #[tracing::instrument(skip(self))]
    async fn find_bid(&self, user: User, bid_id: Uuid) -> Result<Bid, Error> {
        let bid = self.fetch_bid(bid_id).await?;

        if self.is_allowed(user.clone(), "read", bid.clone())? {
            return Ok(bid);
        }

        let load = self.fetch_load(bid.load_id).await?;
        self.authorize(user, "list_bids", load)?;

        Ok(bid)
    }

    #[tracing::instrument(skip(self))]
    async fn list_bids(&self, user: User, load_id: Uuid) -> Result<Vec<Bid>, Error> {
        let load = self.fetch_load(load_id).await?;
        let sees_all = self.is_allowed(user.clone(), "list_bids", load)?;

        let mut conn = self.pool.acquire().await?;
        let mut results = conn.fetch(
            sqlx::query("SELECT data FROM bids WHERE load_id = $1 ORDER BY (data->>'amount')::BIGINT ASC, id ASC")
                .bind(&load_id),
        );

        let mut bids = Vec::new();
        while let Some(row) = results.try_next().await? {
            let Json(bid): Json<Bid> = row.try_get("data")?;

            if sees_all || bid.carrier_id == user.id {
                bids.push(bid);
            }
        }

        Ok(bids)
    }
}
