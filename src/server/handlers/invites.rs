use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::DynAPI;
use crate::auth::User;
use crate::entities::{Profile, TeamInvite};
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct CreateParams {
    seats_to_allocate: i32,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(subscription_id): Path<Uuid>,
    Json(params): Json<CreateParams>,
) -> Result<Json<TeamInvite>, Error> {
    let invite = api
        .create_invite(user, subscription_id, params.seats_to_allocate)
        .await?;

    Ok(invite.into())
}

pub async fn list(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<Vec<TeamInvite>>, Error> {
    let invites = api.list_invites(user, subscription_id).await?;

    Ok(invites.into())
}

pub async fn claim(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(token): Path<String>,
) -> Result<Json<Profile>, Error> {
    let profile = api.claim_invite(user, token).await?;

    Ok(profile.into())
}

pub async fn revoke(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<TeamInvite>, Error> {
    let invite = api.revoke_invite(user, id).await?;

    Ok(invite.into())
}
