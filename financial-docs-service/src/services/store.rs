//! Persistence boundary for financial documents.
//!
//! The engine does not own a database; it saves and fetches whole documents
//! through [`DocumentStore`].

use crate::error::StoreError;
use crate::models::FinancialDocument;
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use service_core::retry::{retry_with_backoff, RetryConfig};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Save/fetch boundary for whole documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist the document and return the stored copy.
    async fn save(&self, document: &FinancialDocument) -> Result<FinancialDocument, StoreError>;

    async fn fetch(&self, id: Uuid) -> Result<FinancialDocument, StoreError>;
}

/// Process-local store.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: DashMap<Uuid, FinancialDocument>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn save(&self, document: &FinancialDocument) -> Result<FinancialDocument, StoreError> {
        self.documents.insert(document.id(), document.clone());
        Ok(document.clone())
    }

    async fn fetch(&self, id: Uuid) -> Result<FinancialDocument, StoreError> {
        self.documents
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound(id))
    }
}

/// Store backed by a JSON document API:
/// `PUT {base_url}/documents/{id}` and `GET {base_url}/documents/{id}`.
pub struct HttpDocumentStore {
    client: Client,
    base_url: String,
    retry: RetryConfig,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Transient(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
        })
    }

    /// Retry policy for reads. Saves are retried by the autosave controller.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn document_url(&self, id: Uuid) -> String {
        format!("{}/documents/{}", self.base_url, id)
    }

    async fn error_for(id: Uuid, response: reqwest::Response) -> StoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::NOT_FOUND {
            StoreError::NotFound(id)
        } else if status.is_client_error() {
            StoreError::Rejected(format!("store returned {}: {}", status, body))
        } else {
            StoreError::Transient(format!("store returned {}: {}", status, body))
        }
    }

    async fn fetch_once(&self, id: Uuid) -> Result<FinancialDocument, StoreError> {
        let response = self
            .client
            .get(self.document_url(id))
            .send()
            .await
            .map_err(|e| StoreError::Transient(format!("Failed to reach store: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::error_for(id, response).await);
        }

        response
            .json::<FinancialDocument>()
            .await
            .map_err(|e| StoreError::Rejected(format!("Unreadable document from store: {}", e)))
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    #[instrument(skip(self, document), fields(document_id = %document.id()))]
    async fn save(&self, document: &FinancialDocument) -> Result<FinancialDocument, StoreError> {
        let response = self
            .client
            .put(self.document_url(document.id()))
            .json(document)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Document store unreachable");
                StoreError::Transient(format!("Failed to reach store: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(Self::error_for(document.id(), response).await);
        }

        let saved = response
            .json::<FinancialDocument>()
            .await
            .map_err(|e| StoreError::Rejected(format!("Unreadable document from store: {}", e)))?;

        info!(document_number = %saved.document_number(), "Document saved");

        Ok(saved)
    }

    #[instrument(skip(self), fields(document_id = %id))]
    async fn fetch(&self, id: Uuid) -> Result<FinancialDocument, StoreError> {
        retry_with_backoff(&self.retry, "fetch_document", || self.fetch_once(id)).await
    }
}
