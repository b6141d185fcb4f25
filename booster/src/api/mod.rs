//! Admin API.
//!
//! `GET /` and `GET /metrics` are public. Every other route requires the configured key in the
//! `X-API-Key` header:
//!
//! | Route | Method | Action |
//! |-------|--------|--------|
//! | `/validators` | GET | List validators |
//! | `/validators` | POST | Register a validator |
//! | `/validators/{pubkey}` | PUT | Change operator address or threshold |
//! | `/validators/{pubkey}` | DELETE | Remove a validator |
//! | `/boosts/pending` | GET | List unactivated queue boosts |
//! | `/ticks` | POST | Run one tick now |
//!
//! Successful replies are `{"code": 200, "data": ...}`; failures are `{"code", "message"}`.
//!
//! Browser clients need a [cors] layer on top of the [router].

use crate::{
    orchestrator::{Report, Trigger},
    store::Store,
    telemetry,
};
use axum::{
    extract::{Request, State},
    http::{
        header::{self, InvalidHeaderValue},
        HeaderName, HeaderValue, Method,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use prometheus_client::registry::Registry;
use serde::Serialize;
use std::{future::Future, io, sync::Arc};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

pub mod response;
use response::{Failure, Reply};
mod validators;
pub use validators::{Done, Update};

/// Header carrying the admin key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared state of every handler.
pub struct Context<S: Store> {
    store: S,
    trigger: Arc<dyn Trigger>,
    registry: Arc<Registry>,
    key: Arc<str>,
}

impl<S: Store> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            trigger: self.trigger.clone(),
            registry: self.registry.clone(),
            key: self.key.clone(),
        }
    }
}

impl<S: Store> Context<S> {
    pub fn new(store: S, trigger: Arc<dyn Trigger>, registry: Arc<Registry>, key: &str) -> Self {
        Self {
            store,
            trigger,
            registry,
            key: key.into(),
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

/// Builds the router.
pub fn router<S: Store>(context: Context<S>) -> Router {
    let admin = Router::new()
        .route(
            "/validators",
            get(validators::list::<S>).post(validators::add::<S>),
        )
        .route(
            "/validators/{pubkey}",
            put(validators::update::<S>).delete(validators::delete::<S>),
        )
        .route("/boosts/pending", get(validators::pending::<S>))
        .route("/ticks", post(tick::<S>))
        .route_layer(middleware::from_fn_with_state(context.clone(), authorize::<S>));
    Router::new()
        .route("/", get(health))
        .route("/metrics", get(metrics::<S>))
        .merge(admin)
        .with_state(context)
}

/// Builds the CORS policy for `origins`, where `*` allows any origin.
///
/// Returns `None` if no origin is configured.
pub fn cors(origins: &[String]) -> Result<Option<CorsLayer>, InvalidHeaderValue> {
    if origins.is_empty() {
        return Ok(None);
    }
    let allow = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let origins = origins
            .iter()
            .map(|origin| HeaderValue::from_str(origin))
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };
    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([
                header::CONTENT_TYPE,
                HeaderName::from_static(API_KEY_HEADER),
            ]),
    ))
}

/// Serves `router` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> io::Result<()> {
    info!(addr = ?listener.local_addr()?, "admin api listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn authorize<S: Store>(
    State(context): State<Context<S>>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    if provided != Some(&*context.key) {
        warn!(path = %request.uri().path(), "rejected request with invalid api key");
        return Failure::unauthorized().into_response();
    }
    next.run(request).await
}

async fn health() -> Reply<Health> {
    Reply(Health { status: "ok" })
}

async fn metrics<S: Store>(State(context): State<Context<S>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, telemetry::METRICS_CONTENT_TYPE)],
        telemetry::encode_metrics(&context.registry),
    )
}

async fn tick<S: Store>(State(context): State<Context<S>>) -> Result<Reply<Report>, Failure> {
    Ok(Reply(context.trigger.trigger().await?))
}
