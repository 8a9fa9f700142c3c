//! HTTP adapter for the marketplace checkout core.
//!
//! Identity comes from the surrounding auth layer as headers
//! (`x-user-id`, `x-user-role`, `x-session-id`). Structured logging goes
//! through tracing and metrics are exported for Prometheus.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post, put};
use marketplace::{CheckoutConfig, Marketplace, NotificationSink};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Notification sink shared by checkout and the order lifecycle.
pub type SharedNotifier = Arc<dyn NotificationSink>;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub market: Marketplace<S, SharedNotifier>,
    pub store: S,
}

/// Wires the marketplace services over a store.
pub fn create_state<S: Store + Clone + 'static>(
    store: S,
    notifier: SharedNotifier,
    config: CheckoutConfig,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        market: Marketplace::new(store.clone(), notifier, config),
        store,
    })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route(
            "/cart",
            get(routes::carts::view::<S>).delete(routes::carts::clear::<S>),
        )
        .route("/cart/items", post(routes::carts::add::<S>))
        .route(
            "/cart/items/{item_id}",
            patch(routes::carts::update::<S>).delete(routes::carts::remove::<S>),
        )
        .route("/cart/problems", get(routes::carts::problems::<S>))
        .route("/cart/merge", post(routes::carts::merge::<S>))
        .route("/checkout", post(routes::checkout::place_order::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/events", get(routes::orders::events::<S>))
        .route("/orders/{id}/status", post(routes::orders::transition::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/orders/{id}/tracking", put(routes::orders::tracking::<S>))
        .route("/order-numbers/{number}", get(routes::orders::get_by_number::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
