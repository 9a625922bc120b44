//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, limits, request ID, cache headers)
//! - Serve HTTP/1.1 connections handed out by the graceful listener
//! - Start graceful shutdown of keep-alive connections once draining begins

use std::future::Future;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderValue, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, put},
    Router,
};
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tower_http::{
    add_extension::AddExtension,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::BrokerConfig;
use crate::http::delivery::{DeliveryStream, PendingDeliveries};
use crate::http::queue;
use crate::net::{GracefulListener, ListenerError};
use crate::observability::metrics;
use crate::storage::QueueStore;

/// Every response is private and must not be cached.
const CACHE_CONTROL_VALUE: &str = "private, max-age=0, no-store";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: QueueStore,
}

/// HTTP front end for the queue store.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &BrokerConfig, store: QueueStore) -> Self {
        let router = Self::build_router(config, AppState { store });
        Self { router }
    }

    /// The fully layered router, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &BrokerConfig, state: AppState) -> Router {
        Router::new()
            .route("/queue/{name}", put(queue::enqueue).get(queue::dequeue))
            .route("/ping", any(ping_handler))
            .fallback(fallback_handler)
            .with_state(state)
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                HeaderValue::from_static(CACHE_CONTROL_VALUE),
            ))
            .layer(middleware::from_fn(record_metrics))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve connections from `listener` until it is stopped.
    ///
    /// Returns `Ok` once the listener reports it has stopped; a fatal accept
    /// error is returned to the caller, which must stop serving.
    pub async fn run(self, mut listener: GracefulListener) -> Result<(), ListenerError> {
        let stop = listener.stop_handle();
        tracing::info!(address = %listener.local_addr(), "HTTP server starting");

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(ListenerError::Stopped) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Listener failed, HTTP server stopping");
                    return Err(e);
                }
            };

            let router = self.router.clone();
            let mut draining = stop.subscribe();
            tokio::spawn(async move {
                let connection_id = stream.id();
                let stop_requested = async move {
                    let _ = draining.wait_for(|stopping| *stopping).await;
                };
                if let Err(e) = serve_connection(stream, router, stop_requested).await {
                    tracing::debug!(
                        connection_id = %connection_id,
                        peer_addr = %peer_addr,
                        error = %e,
                        "Connection ended with error"
                    );
                }
            });
        }

        tracing::info!("HTTP server stopped accepting");
        Ok(())
    }
}

/// Drive one HTTP/1.1 connection; finish the in-flight request and close once
/// `stop_requested` resolves.
///
/// Messages delivered on this connection are acknowledged only after their
/// response has been flushed to `io`; see [`crate::http::delivery`].
pub(crate) async fn serve_connection<I>(
    io: I,
    router: Router,
    stop_requested: impl Future<Output = ()>,
) -> Result<(), hyper::Error>
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let pending = PendingDeliveries::default();
    let service = TowerToHyperService::new(AddExtension::new(router, pending.clone()));
    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .serve_connection(TokioIo::new(DeliveryStream::new(io, pending)), service);
    tokio::pin!(conn);
    tokio::pin!(stop_requested);

    tokio::select! {
        res = conn.as_mut() => res,
        _ = &mut stop_requested => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    }
}

/// `/ping`: GET and HEAD echo the request URI, other methods echo the body.
async fn ping_handler(method: Method, uri: Uri, body: Bytes) -> Response {
    if method == Method::GET || method == Method::HEAD {
        return uri.to_string().into_response();
    }
    Body::from(body).into_response()
}

/// Paths under `/queue` without exactly one name segment are malformed input.
async fn fallback_handler(uri: Uri) -> Response {
    let path = uri.path();
    if path == "/queue" || path.starts_with("/queue/") {
        tracing::debug!(path = %path, "Malformed queue path");
        return (StatusCode::BAD_REQUEST, "Expected /queue/{name}").into_response();
    }
    (StatusCode::NOT_FOUND, "Not found").into_response()
}

async fn record_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let response = next.run(request).await;
    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}
