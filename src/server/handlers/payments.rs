use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::DynAPI;
use crate::auth::User;
use crate::entities::Payment;
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct EscrowParams {
    external_charge_ref: String,
}

#[derive(Serialize, Deserialize)]
pub struct ReasonParams {
    reason: String,
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>, Error> {
    let payment = api.find_payment(user, id).await?;

    Ok(payment.into())
}

pub async fn open_escrow(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<EscrowParams>,
) -> Result<Json<Payment>, Error> {
    let payment = api.open_escrow(user, id, params.external_charge_ref).await?;

    Ok(payment.into())
}

pub async fn release(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<ReasonParams>,
) -> Result<Json<Payment>, Error> {
    let payment = api.release(user, id, params.reason).await?;

    Ok(payment.into())
}

pub async fn refund(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<ReasonParams>,
) -> Result<Json<Payment>, Error> {
    let payment = api.refund(user, id, params.reason).await?;

    Ok(payment.into())
}

pub async fn flag_dispute(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<ReasonParams>,
) -> Result<Json<Payment>, Error> {
    let payment = api.flag_dispute(user, id, params.reason).await?;

    Ok(payment.into())
}

pub async fn confirm_settlement(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>, Error> {
    let payment = api.confirm_settlement(user, id).await?;

    Ok(payment.into())
}

pub async fn mark_failed(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<ReasonParams>,
) -> Result<Json<Payment>, Error> {
    let payment = api.mark_failed(user, id, params.reason).await?;

    Ok(payment.into())
}
