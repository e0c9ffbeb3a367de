use axum::extract::{Extension, Json, Path};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::DynAPI;
use crate::auth::User;
use crate::entities::Payment;
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct ResolveParams {
    release_to_carrier: bool,
    reason: String,
}

pub async fn resolve(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(load_id): Path<Uuid>,
    Json(params): Json<ResolveParams>,
) -> Result<Json<Payment>, Error> {
    let payment = api
        .resolve_dispute(user, load_id, params.release_to_carrier, params.reason)
        .await?;

    Ok(payment.into())
}
