use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing_subscriber::EnvFilter;

use haulmark::api::DynAPI;
use haulmark::auth::User;
use haulmark::config::Config;
use haulmark::db::PgPool;
use haulmark::engine::Engine;
use haulmark::error::Error;
use haulmark::external::{HttpDocumentStore, HttpPaymentRail};
use haulmark::server::serve;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let PgPool(pool) = PgPool::new(&config.database_url, config.database_max_connections).await?;

    let rail = Arc::new(HttpPaymentRail::new(config.payment_rail.clone()));
    let documents = Arc::new(HttpDocumentStore::new(config.document_store_base.clone()));

    let engine = Engine::new(pool, rail, documents, config.policy.clone()).await?;
    let api = Arc::new(engine) as DynAPI;

    tokio::spawn(run_sweeps(
        api.clone(),
        Duration::from_secs(config.sweep_interval_secs),
    ));

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .map_err(|_| Error::config_error("LISTEN_ADDR"))?;

    serve(api, addr).await
}

async fn run_sweeps(api: DynAPI, period: Duration) {
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;

        let user = User::new_system_user();
        let now = Utc::now();

        if let Err(err) = api.expire_bids(user.clone(), now).await {
            tracing::error!(error = %err, "bid expiry sweep failed");
        }

        if let Err(err) = api.expire_invites(user.clone(), now).await {
            tracing::error!(error = %err, "invite expiry sweep failed");
        }

        if let Err(err) = api.auto_release_payments(user, now).await {
            tracing::error!(error = %err, "payment auto-release sweep failed");
        }
    }
}
