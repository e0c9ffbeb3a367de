use axum::extract::{Extension, Json};
use chrono::Utc;
use serde::Serialize;

use crate::api::DynAPI;
use crate::auth::User;
use crate::error::Error;

#[derive(Serialize)]
pub struct SweepResult {
    affected: u64,
}

pub async fn expire_bids(
    Extension(api): Extension<DynAPI>,
    user: User,
) -> Result<Json<SweepResult>, Error> {
    let affected = api.expire_bids(user, Utc::now()).await?;

    Ok(SweepResult { affected }.into())
}

pub async fn expire_invites(
    Extension(api): Extension<DynAPI>,
    user: User,
) -> Result<Json<SweepResult>, Error> {
    let affected = api.expire_invites(user, Utc::now()).await?;

    Ok(SweepResult { affected }.into())
}

pub async fn auto_release_payments(
    Extension(api): Extension<DynAPI>,
    user: User,
) -> Result<Json<SweepResult>, Error> {
    let affected = api.auto_release_payments(user, Utc::now()).await?;

    Ok(SweepResult { affected }.into())
}
