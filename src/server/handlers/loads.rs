use axum::extract::{Extension, Json, Path};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::DynAPI;
use crate::auth::User;
use crate::entities::{Load, LoadParams, LoadStatus};
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct AdvanceStatusParams {
    status: LoadStatus,
    proof_of_delivery: Option<String>,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<LoadParams>,
) -> Result<Json<Load>, Error> {
    let load = api.create_load(user, params).await?;

    Ok(load.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Load>, Error> {
    let load = api.find_load(user, id).await?;

    Ok(load.into())
}

pub async fn update(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<LoadParams>,
) -> Result<Json<Load>, Error> {
    let load = api.update_load(user, id, params).await?;

    Ok(load.into())
}

pub async fn post(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Load>, Error> {
    let load = api.post_load(user, id).await?;

    Ok(load.into())
}

pub async fn cancel(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Load>, Error> {
    let load = api.cancel_load(user, id).await?;

    Ok(load.into())
}

pub async fn remove(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, Error> {
    api.delete_load(user, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn advance_status(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<AdvanceStatusParams>,
) -> Result<Json<Load>, Error> {
    let load = api
        .advance_load_status(user, id, params.status, params.proof_of_delivery)
        .await?;

    Ok(load.into())
}
