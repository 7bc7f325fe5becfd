use crate::config::SummarizerConfig;
use crate::handlers;
use crate::services::{build_provider, SummaryProvider, UploadStore};
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::{request_id_middleware, request_id_of};
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: SummarizerConfig,
    pub provider: Arc<dyn SummaryProvider>,
    pub uploads: UploadStore,
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl Application {
    pub async fn build(config: SummarizerConfig) -> Result<Self, AppError> {
        let provider = build_provider(&config).map_err(|e| {
            tracing::error!("Failed to initialize summary provider: {}", e);
            AppError::ConfigError(e.into())
        })?;

        Self::build_with_provider(config, provider).await
    }

    /// Build around an already constructed provider. Tests use this to inject mocks.
    pub async fn build_with_provider(
        config: SummarizerConfig,
        provider: Arc<dyn SummaryProvider>,
    ) -> Result<Self, AppError> {
        let uploads = UploadStore::new(&config.upload.dir);
        uploads.ensure_dir().await.map_err(|e| {
            tracing::error!(
                "Failed to create upload directory {}: {}",
                config.upload.dir,
                e
            );
            e
        })?;

        tracing::info!(
            provider = provider.name(),
            model = provider.model(),
            upload_dir = %config.upload.dir,
            max_upload_bytes = config.upload.max_bytes,
            "Initialized summary provider"
        );

        let state = AppState {
            config: config.clone(),
            provider,
            uploads,
        };

        let router = router(state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        Ok(Self {
            port,
            listener,
            router,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn upload_dir(&self) -> &Path {
        self.state.uploads.dir()
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }

    /// Serve until `signal` resolves, then finish in-flight requests.
    pub async fn run_with_shutdown<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(signal)
            .await
    }
}

fn router(state: AppState) -> Router {
    let body_limit = state.config.upload.max_bytes;

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/summarize", post(handlers::summarize))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    request_id = %request_id_of(request),
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        // Outermost, so the trace span above already sees the request id.
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
