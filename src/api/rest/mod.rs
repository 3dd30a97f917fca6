pub mod customers;
pub mod drivers;
mod json;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use self::json::Json;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(customers::router())
        .merge(drivers::router())
        .merge(orders::router())
        .merge(payments::router())
        .merge(notifications::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    customers: usize,
    drivers: usize,
    orders: usize,
    payments: usize,
    notifications_in_queue: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        customers: state.customers.len(),
        drivers: state.drivers.len(),
        orders: state.orders.len(),
        payments: state.payments.len(),
        notifications_in_queue: state.metrics.notifications_in_queue.get(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
