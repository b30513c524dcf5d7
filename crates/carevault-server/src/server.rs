use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get},
};
use carevault_auth::{AccessGrantRegistry, AuthorizationEngine};
use carevault_core::audit::{AuditLog, TracingAlertSink};
use carevault_core::system_clock;
use carevault_db_memory::create_backends;
use carevault_storage::VersionManager;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::{AppConfig, AuditMode};
use crate::service::{ClinicalService, ServiceSettings};
use crate::validation::BasicStructuralValidator;
use crate::{handlers, middleware as app_middleware};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: ClinicalService,
    /// Cancelled on shutdown; each request works on a child token.
    pub shutdown: CancellationToken,
}

/// Wire stores, audit log, registry, engine and version manager together.
///
/// In `background` audit mode the writer task is spawned on the current
/// runtime and its handle returned.
pub fn build_state(cfg: &AppConfig) -> anyhow::Result<(AppState, Option<JoinHandle<()>>)> {
    let backends = create_backends(&cfg.storage);
    let clock = system_clock();

    let (audit, writer) = match cfg.audit.mode {
        AuditMode::Inline => (AuditLog::inline(backends.audit.clone(), clock.clone()), None),
        AuditMode::Background => {
            let (log, writer) = AuditLog::background(
                backends.audit.clone(),
                clock.clone(),
                Arc::new(TracingAlertSink),
                cfg.audit.channel_capacity,
            );
            (log, Some(tokio::spawn(writer.run())))
        }
    };

    let client_assigned = cfg
        .resources
        .client_assigned_types()
        .map_err(anyhow::Error::msg)?;
    let versions = VersionManager::new(
        backends.resources.clone(),
        Arc::new(BasicStructuralValidator),
        audit.clone(),
        clock.clone(),
    )
    .with_client_assigned_ids(client_assigned);

    let registry = AccessGrantRegistry::new(backends.grants.clone(), audit.clone(), clock);
    let engine = AuthorizationEngine::new(registry, backends.directory.clone(), audit.clone());
    let settings = ServiceSettings {
        max_update_retries: cfg.resources.max_update_retries,
        default_count: cfg.paging.default_count,
        max_count: cfg.paging.max_count,
    };

    tracing::info!(
        audit_mode = ?cfg.audit.mode,
        max_update_retries = settings.max_update_retries,
        "Clinical service assembled"
    );
    let state = AppState {
        service: ClinicalService::new(engine, Arc::new(versions), audit, settings),
        shutdown: CancellationToken::new(),
    };
    Ok((state, writer))
}

pub fn router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/access-grants",
            get(handlers::list_grants).post(handlers::create_grant),
        )
        .route("/access-grants/{id}", delete(handlers::revoke_grant))
        .route("/audit-events", get(handlers::audit_events))
        .route(
            "/{resource_type}",
            get(handlers::search_resources).post(handlers::create_resource),
        )
        .route(
            "/{resource_type}/{id}",
            get(handlers::read_resource)
                .put(handlers::update_resource)
                .delete(handlers::delete_resource),
        )
        .route(
            "/{resource_type}/{id}/_history",
            get(handlers::resource_history),
        )
        .route(
            "/{resource_type}/{id}/_history/{version}",
            get(handlers::resource_version),
        )
        .with_state(state)
        // Layers run bottom-up: request id first, then trace, cors, body limit.
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                        span.record("http.status_code", tracing::field::display(res.status().as_u16()));
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
}

/// Build the full application router from configuration.
pub fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let (state, _writer) = build_state(cfg)?;
    Ok(router(state, cfg.server.body_limit_bytes))
}

pub struct CarevaultServer {
    addr: SocketAddr,
    app: Router,
    shutdown: CancellationToken,
    audit_writer: Option<JoinHandle<()>>,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Must be called within a Tokio runtime when the audit mode is `background`.
    pub fn build(self) -> anyhow::Result<CarevaultServer> {
        let (state, audit_writer) = build_state(&self.config)?;
        let shutdown = state.shutdown.clone();
        let app = router(state, self.config.server.body_limit_bytes);
        Ok(CarevaultServer {
            addr: self.addr,
            app,
            shutdown,
            audit_writer,
        })
    }
}

impl CarevaultServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already-bound listener until `signal` resolves.
    pub async fn serve(
        self,
        listener: tokio::net::TcpListener,
        signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move {
                signal.await;
                shutdown.cancel();
            })
            .await?;

        // The router and every audit sender are gone now; let the writer drain.
        if let Some(writer) = self.audit_writer {
            match tokio::time::timeout(std::time::Duration::from_secs(5), writer).await {
                Ok(_) => tracing::info!("Audit writer drained"),
                Err(_) => tracing::warn!("Audit writer did not drain within 5s"),
            }
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app(body_limit: usize) -> Router {
        let (state, _writer) = build_state(&AppConfig::default()).unwrap();
        router(state, body_limit)
    }

    fn post_patient(body: Vec<u8>) -> Request<Body> {
        Request::post("/Patient")
            .header("x-user-id", "dr-a")
            .header("x-user-role", "HealthcareProvider")
            .header("x-tenant-id", "tenant-1")
            .header("x-request-id", "req-42")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_gets_a_request_id() {
        let res = app(1024)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key(app_middleware::REQUEST_ID));
    }

    #[tokio::test]
    async fn test_create_echoes_correlation_id() {
        let res = app(64 * 1024)
            .oneshot(post_patient(br#"{"resourceType":"Patient"}"#.to_vec()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers()[app_middleware::REQUEST_ID], "req-42");
        assert!(res.headers().contains_key("etag"));

        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["correlationId"], "req-42");
        assert_eq!(json["data"]["meta"]["versionId"], "1");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let mut payload = br#"{"resourceType":"Patient","text":""#.to_vec();
        payload.extend(std::iter::repeat_n(b'x', 256));
        payload.extend(br#""}"#);
        let res = app(128).oneshot(post_patient(payload)).await.unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
