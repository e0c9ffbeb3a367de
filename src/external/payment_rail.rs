use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::config::RailConfig;
use crate::error::Error;

const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
const BASE_BACKOFF_MILLIS: u64 = 200;

/// A move of escrowed funds. The idempotency key is derived from the payment so a
/// retried or replayed call can never move the money twice.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FundsMovement {
    pub idempotency_key: String,
    pub charge_reference: String,
    pub payment_id: Uuid,
    pub beneficiary_id: Uuid,
    pub amount: i64,
}

impl FundsMovement {
    pub fn transfer(
        payment_id: Uuid,
        charge_reference: String,
        carrier_id: Uuid,
        amount: i64,
    ) -> Self {
        Self {
            idempotency_key: format!("transfer-{}", payment_id),
            charge_reference,
            payment_id,
            beneficiary_id: carrier_id,
            amount,
        }
    }

    pub fn refund(payment_id: Uuid, charge_reference: String, shipper_id: Uuid, amount: i64) -> Self {
        Self {
            idempotency_key: format!("refund-{}", payment_id),
            charge_reference,
            payment_id,
            beneficiary_id: shipper_id,
            amount,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Receipt {
    pub reference: String,
    pub settled: bool,
}

/// The escrow-capable processor holding shipper funds.
#[async_trait]
pub trait PaymentRail: Send + Sync {
    async fn transfer(&self, movement: &FundsMovement) -> Result<Receipt, Error>;
    async fn refund(&self, movement: &FundsMovement) -> Result<Receipt, Error>;
}

#[derive(Debug)]
pub struct HttpPaymentRail {
    client: reqwest::Client,
    config: RailConfig,
}

impl HttpPaymentRail {
    pub fn new(config: RailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    #[tracing::instrument(skip(self, movement), fields(key = %movement.idempotency_key))]
    async fn post(&self, path: &str, movement: &FundsMovement) -> Result<Receipt, Error> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let max_attempts = self.config.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;

            let result = self
                .client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .header(IDEMPOTENCY_KEY_HEADER, &movement.idempotency_key)
                .json(movement)
                .send()
                .await;

            let transient = match result {
                Ok(res) => {
                    let status = res.status();

                    if status.is_success() {
                        return Ok(res.json().await?);
                    }

                    if status.is_client_error() && status.as_u16() != 429 {
                        tracing::warn!(status = status.as_u16(), "payment rail refused the request");
                        return Err(Error::upstream_error());
                    }

                    format!("status {}", status.as_u16())
                }
                Err(err) if err.is_connect() || err.is_timeout() => err.to_string(),
                Err(err) => return Err(err.into()),
            };

            if attempt >= max_attempts {
                tracing::error!(attempt, error = %transient, "payment rail unavailable, giving up");
                return Err(Error::upstream_error());
            }

            let backoff = Duration::from_millis(BASE_BACKOFF_MILLIS * 2u64.pow(attempt - 1));
            tracing::warn!(
                attempt,
                max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %transient,
                "transient payment rail failure, retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

#[async_trait]
impl PaymentRail for HttpPaymentRail {
    async fn transfer(&self, movement: &FundsMovement) -> Result<Receipt, Error> {
        self.post("transfers", movement).await
    }

    async fn refund(&self, movement: &FundsMovement) -> Result<Receipt, Error> {
        self.post("refunds", movement).await
    }
}

#[test]
fn idempotency_keys_are_stable_per_payment() {
    let payment_id = Uuid::new_v4();
    let carrier_id = Uuid::new_v4();

    let first = FundsMovement::transfer(payment_id, "ch_1".into(), carrier_id, 100);
    let second = FundsMovement::transfer(payment_id, "ch_1".into(), carrier_id, 100);
    let refund = FundsMovement::refund(payment_id, "ch_1".into(), Uuid::new_v4(), 100);

    assert_eq!(first.idempotency_key, second.idempotency_key);
    assert_ne!(first.idempotency_key, refund.idempotency_key);
}
