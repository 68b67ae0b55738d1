//! Application startup and lifecycle management.

use crate::config::{DocumentsConfig, StoreBackend};
use crate::export::{CompanyProfile, PdfExporter};
use crate::handlers::{documents, health_check, metrics_endpoint};
use crate::lifecycle::StatusLifecycle;
use crate::session::SessionFactory;
use crate::services::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION};
use crate::services::{
    DocumentNotifier, DocumentNumberer, DocumentStore, HttpDocumentStore, InMemoryDocumentStore,
    LogNotifier, SequentialNumberer, SmtpNotifier,
};
use axum::{
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: DocumentsConfig,
    pub store: Arc<dyn DocumentStore>,
    pub numberer: Arc<dyn DocumentNumberer>,
    pub lifecycle: Arc<StatusLifecycle>,
    pub exporter: PdfExporter,
    /// Editing sessions with autosave and crash-recovery backups.
    pub sessions: SessionFactory,
}

impl AppState {
    /// Wire collaborators from configuration.
    pub fn from_config(config: DocumentsConfig) -> Result<Self, AppError> {
        let exporter = PdfExporter::new(CompanyProfile::from(&config.company));

        let store: Arc<dyn DocumentStore> = match config.store.backend {
            StoreBackend::Memory => {
                tracing::info!("Using in-memory document store");
                Arc::new(InMemoryDocumentStore::new())
            }
            StoreBackend::Http => {
                let base_url = config.store.base_url.as_deref().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("store.base_url is not set"))
                })?;
                tracing::info!(base_url = %base_url, "Using HTTP document store");
                Arc::new(
                    HttpDocumentStore::new(
                        base_url,
                        Duration::from_secs(config.store.timeout_secs),
                    )
                    .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?,
                )
            }
        };

        let notifier: Arc<dyn DocumentNotifier> = if config.smtp.enabled {
            match SmtpNotifier::new(config.smtp.clone(), exporter.clone()) {
                Ok(notifier) => {
                    tracing::info!("SMTP notifier initialized");
                    Arc::new(notifier)
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP notifier: {}. Logging only.", e);
                    Arc::new(LogNotifier)
                }
            }
        } else {
            tracing::info!("SMTP disabled, client notifications are logged only");
            Arc::new(LogNotifier)
        };

        Ok(Self::with_collaborators(config, store, notifier))
    }

    /// Assemble state around an existing store and notifier.
    pub fn with_collaborators(
        config: DocumentsConfig,
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn DocumentNotifier>,
    ) -> Self {
        let exporter = PdfExporter::new(CompanyProfile::from(&config.company));

        if config.store.backend == StoreBackend::Http && config.numbering.continue_from.is_empty() {
            tracing::warn!(
                "numbering.continue_from is empty; document numbers restart at 1 with a persistent store"
            );
        }

        Self {
            numberer: Arc::new(SequentialNumberer::new(config.numbering.clone())),
            lifecycle: Arc::new(StatusLifecycle::new(notifier)),
            sessions: SessionFactory::new(config.autosave.clone(), Arc::clone(&store)),
            store,
            exporter,
            config,
        }
    }
}

/// Count and time every request by its route template.
async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let started = Instant::now();

    let response = next.run(request).await;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[route.as_str(), response.status().as_str()])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[route.as_str()])
        .observe(started.elapsed().as_secs_f64());

    response
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/documents", post(documents::create_document))
        .route("/documents/calculate", post(documents::calculate))
        .route(
            "/documents/:id",
            get(documents::get_document).put(documents::save_document),
        )
        .route("/documents/:id/transitions", post(documents::transition_document))
        .route("/documents/:id/reopen", post(documents::reopen_document))
        .route("/documents/:id/payments", post(documents::record_payment))
        .route("/documents/:id/convert", post(documents::convert_to_invoice))
        .route("/documents/:id/pdf", get(documents::download_pdf));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .nest("/v1", api)
        .route_layer(middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: DocumentsConfig) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let state = AppState::from_config(config)?;

        // Port 0 picks a random port for tests.
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Financial documents service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until `shutdown` resolves.
    pub async fn run_until_stopped(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| {
                tracing::error!("HTTP server error: {}", e);
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}
