use crate::cors::with_cors;
use crate::forward::StatisticsClient;
use crate::relay::StatisticsRelay;
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use statrelay_auth::{CachedTokenProvider, ClientCredentialsProvider, TokenProvider, http::build_client};
use statrelay_core::config::STATISTICS_PATH;
use statrelay_core::{Credential, RelayConfig, RelayError};
use statrelay_observability::{AccessLogEntry, MetricsCollector};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared state for the relay routes.
#[derive(Clone)]
pub struct RelayState {
    pub relay: Arc<StatisticsRelay>,
    pub metrics: Arc<MetricsCollector>,
    pub max_body_bytes: usize,
    pub metrics_path: Option<String>,
}

impl RelayState {
    /// Wire the production stack: one shared HTTP client, the client
    /// credentials exchange (cached unless disabled) and the statistics forwarder.
    pub fn from_config(config: &RelayConfig, credential: Credential) -> anyhow::Result<Self> {
        config.validate()?;
        let http = build_client(&config.upstream)?;
        let exchange =
            ClientCredentialsProvider::new(http.clone(), &config.upstream.token_url, credential);

        let tokens: Arc<dyn TokenProvider> = if config.token_cache.enabled {
            Arc::new(CachedTokenProvider::new(
                exchange,
                config.token_cache.refresh_skew(),
            ))
        } else {
            Arc::new(exchange)
        };

        let prometheus = &config.observability.prometheus;
        let metrics = Arc::new(MetricsCollector::new(prometheus.enabled)?);
        let upstream = StatisticsClient::new(http, &config.upstream.statistics_url);

        Ok(Self {
            relay: Arc::new(StatisticsRelay::new(tokens, upstream, metrics.clone())),
            metrics,
            max_body_bytes: config.server.max_body_bytes,
            metrics_path: prometheus.enabled.then(|| prometheus.path.clone()),
        })
    }
}

/// Build the relay router: the statistics route, optional metrics, CORS and
/// access logging around everything.
pub fn build_router(state: RelayState) -> Router {
    let mut app = Router::new().route(
        STATISTICS_PATH,
        post(get_statistics).fallback(not_found),
    );

    if let Some(path) = state.metrics_path.as_deref() {
        app = app.route(path, get(metrics_handler));
    }

    let app = app.fallback(not_found).with_state(state);
    with_cors(app).layer(middleware::from_fn(access_log))
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}

async fn get_statistics(State(state): State<RelayState>, body: Body) -> Response {
    let raw_body = match to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return state
                .relay
                .reject(RelayError::Body(e.to_string()))
                .into_response();
        }
    };

    state
        .relay
        .handle_statistics_request(raw_body)
        .await
        .into_response()
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn metrics_handler(State(state): State<RelayState>) -> Response {
    (
        [(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        state.metrics.render(),
    )
        .into_response()
}

/// Tag each request with an id and emit one access log entry per response.
async fn access_log(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let method = request.method().to_string();
    let uri = request.uri().path().to_string();

    let span = info_span!("request", request_id = %request_id);
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    AccessLogEntry::new(
        request_id,
        client_ip,
        method,
        uri,
        response.status().as_u16(),
        started.elapsed().as_secs_f64() * 1000.0,
    )
    .emit();

    response
}

/// Bind the listener for `config` and log where it is running.
pub async fn bind(config: &RelayConfig) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(config.listen_addr()).await?;
    info!(
        addr = %listener.local_addr()?,
        "Server is running on port {}",
        config.port
    );
    Ok(listener)
}
