use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;

use crate::access::Actor;
use crate::engine::payments::{initiate_payment, InitiatePayment, InitiatedPayment};
use crate::engine::reconcile::{handle_payment_callback, CallbackOutcome};
use crate::error::AppError;
use crate::gateways::kopokopo::SIGNATURE_HEADER;
use crate::models::payment::Payment;
use crate::state::AppState;

use super::json::Json;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payments", get(list_payments))
        .route("/payments/initiate", post(initiate))
        .route("/payments/callback", post(callback))
}

async fn initiate(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<InitiatePayment>,
) -> Result<Json<InitiatedPayment>, AppError> {
    Ok(Json(initiate_payment(&state, &actor, payload).await?))
}

/// Provider webhook. Takes the raw body so the signature covers exactly the
/// bytes that were sent. Business outcomes are acknowledged with 200; only
/// unreadable, unreferenced, unknown or badly signed callbacks get a 4xx.
async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match handle_payment_callback(&state, &body, signature) {
        Ok(outcome) => {
            let message = match outcome {
                CallbackOutcome::Confirmed | CallbackOutcome::AlreadyConfirmed => {
                    "Payment confirmed"
                }
                CallbackOutcome::Failed | CallbackOutcome::FailureIgnored => "Payment failed",
            };
            (StatusCode::OK, Json(json!({ "message": message }))).into_response()
        }
        Err(err) => {
            tracing::warn!(error = %err, "payment callback rejected");
            err.into_terse_response()
        }
    }
}

async fn list_payments(State(state): State<Arc<AppState>>, actor: Actor) -> Json<Vec<Payment>> {
    let mut payments: Vec<Payment> = state
        .payments
        .iter()
        .filter(|entry| match actor {
            Actor::Admin(_) => true,
            Actor::Customer(id) => entry.customer_id == id,
            Actor::Driver(_) => false,
        })
        .map(|entry| entry.value().clone())
        .collect();
    payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Json(payments)
}
