use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::DynAPI;
use crate::auth::User;
use crate::entities::{BillingCycle, Subscription};
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct CreateParams {
    plan_type: String,
    billing_cycle: BillingCycle,
    seats: i32,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<CreateParams>,
) -> Result<Json<Subscription>, Error> {
    let subscription = api
        .create_subscription(user, params.plan_type, params.billing_cycle, params.seats)
        .await?;

    Ok(subscription.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Subscription>, Error> {
    let subscription = api.find_subscription(user, id).await?;

    Ok(subscription.into())
}

pub async fn remove_member(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path((id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Subscription>, Error> {
    let subscription = api.remove_team_member(user, id, member_id).await?;

    Ok(subscription.into())
}
