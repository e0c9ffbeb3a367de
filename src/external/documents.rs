use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::Error;

/// Existence check against the document store holding proofs of delivery.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn exists(&self, reference: &str) -> Result<bool, Error>;
}

#[derive(Debug)]
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDocumentStore {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    #[tracing::instrument(skip(self))]
    async fn exists(&self, reference: &str) -> Result<bool, Error> {
        let url = format!(
            "{}/documents/{}",
            self.base_url.trim_end_matches('/'),
            reference
        );

        let res = self.client.head(url).send().await?;

        match res.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                tracing::warn!(status = status.as_u16(), "document store error");
                Err(Error::upstream_error())
            }
        }
    }
}
