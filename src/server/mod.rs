mod handlers;

use std::net::SocketAddr;

use axum::{
    extract::Extension,
    routing::{delete, get, patch, post},
    Router,
};

use crate::api::DynAPI;
use crate::error::Error;
use crate::server::handlers::{bids, disputes, invites, loads, payments, subscriptions, sweeps};

pub fn router(api: DynAPI) -> Router {
    Router::new()
        .route("/loads", post(loads::create))
        .route("/loads/:id", get(loads::find).patch(loads::update).delete(loads::remove))
        .route("/loads/:id/post", patch(loads::post))
        .route("/loads/:id/cancel", patch(loads::cancel))
        .route("/loads/:id/status", patch(loads::advance_status))
        .route("/loads/:id/bids", post(bids::submit).get(bids::list))
        .route("/loads/:id/bids/:bid_id/accept", patch(bids::accept))
        .route("/loads/:id/dispute/resolve", patch(disputes::resolve))
        .route("/bids/:id", get(bids::find))
        .route("/bids/:id/counter", patch(bids::counter))
        .route("/bids/:id/respond", patch(bids::respond))
        .route("/payments/:id", get(payments::find))
        .route("/payments/:id/escrow", patch(payments::open_escrow))
        .route("/payments/:id/release", patch(payments::release))
        .route("/payments/:id/refund", patch(payments::refund))
        .route("/payments/:id/dispute", patch(payments::flag_dispute))
        .route("/payments/:id/settle", patch(payments::confirm_settlement))
        .route("/payments/:id/fail", patch(payments::mark_failed))
        .route("/subscriptions", post(subscriptions::create))
        .route("/subscriptions/:id", get(subscriptions::find))
        .route(
            "/subscriptions/:id/invites",
            post(invites::create).get(invites::list),
        )
        .route(
            "/subscriptions/:id/members/:user_id",
            delete(subscriptions::remove_member),
        )
        // the claim segment carries the invite token rather than its id
        .route("/invites/:id/claim", post(invites::claim))
        .route("/invites/:id/revoke", patch(invites::revoke))
        .route("/sweeps/bids", post(sweeps::expire_bids))
        .route("/sweeps/invites", post(sweeps::expire_invites))
        .route("/sweeps/payments", post(sweeps::auto_release_payments))
        .layer(Extension(api))
}

pub async fn serve(api: DynAPI, addr: SocketAddr) -> Result<(), Error> {
    let app = router(api);

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "server terminated");
            Error::unexpected_error()
        })
}
