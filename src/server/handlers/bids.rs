use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{Booking, DynAPI};
use crate::auth::User;
use crate::entities::Bid;
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct SubmitParams {
    amount: i64,
    tracking_url: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct CounterParams {
    counter_amount: i64,
}

#[derive(Serialize, Deserialize)]
pub struct RespondParams {
    accept: bool,
}

pub async fn submit(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(load_id): Path<Uuid>,
    Json(params): Json<SubmitParams>,
) -> Result<Json<Bid>, Error> {
    let bid = api
        .submit_bid(user, load_id, params.amount, params.tracking_url)
        .await?;

    Ok(bid.into())
}

pub async fn list(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(load_id): Path<Uuid>,
) -> Result<Json<Vec<Bid>>, Error> {
    let bids = api.list_bids(user, load_id).await?;

    Ok(bids.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Bid>, Error> {
    let bid = api.find_bid(user, id).await?;

    Ok(bid.into())
}

pub async fn accept(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path((load_id, bid_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Booking>, Error> {
    let booking = api.accept_bid(user, load_id, bid_id).await?;

    Ok(booking.into())
}

pub async fn counter(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<CounterParams>,
) -> Result<Json<Bid>, Error> {
    let bid = api.counter_bid(user, id, params.counter_amount).await?;

    Ok(bid.into())
}

pub async fn respond(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<RespondParams>,
) -> Result<Json<Bid>, Error> {
    let bid = api.respond_to_counter(user, id, params.accept).await?;

    Ok(bid.into())
}
