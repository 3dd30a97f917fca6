use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::access::{can_view_order, Actor};
use crate::engine::assignment::assign_driver;
use crate::engine::lifecycle::{accept_order, create_order, update_status, NewOrder, StatusUpdate};
use crate::error::AppError;
use crate::models::order::Order;
use crate::state::AppState;

use super::json::Json;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create).get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", post(change_status))
        .route("/orders/:id/assign", post(assign))
        .route("/orders/:id/accept", post(accept))
        .route("/track/:tracking_code", get(track_order))
}

#[derive(Deserialize)]
pub struct AssignDriverRequest {
    pub driver_id: Option<Uuid>,
}

async fn create(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = create_order(&state, &actor, payload).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(State(state): State<Arc<AppState>>, actor: Actor) -> Json<Vec<Order>> {
    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .filter(|entry| can_view_order(&actor, entry.value()))
        .map(|entry| entry.value().clone())
        .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Json(orders)
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(&id)
        .filter(|order| can_view_order(&actor, order))
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

    Ok(Json(order.value().clone()))
}

async fn track_order(
    State(state): State<Arc<AppState>>,
    Path(tracking_code): Path<String>,
) -> Result<Json<Order>, AppError> {
    let not_found = || AppError::NotFound("order not found".to_string());

    let order_id = state
        .tracking_codes
        .get(tracking_code.trim())
        .map(|entry| *entry.value())
        .ok_or_else(not_found)?;
    let order = state.orders.get(&order_id).ok_or_else(not_found)?;

    Ok(Json(order.value().clone()))
}

async fn change_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusUpdate>,
) -> Result<Json<Value>, AppError> {
    let order = update_status(&state, &actor, id, payload)?;
    Ok(Json(json!({
        "message": "Status updated successfully",
        "order": order,
    })))
}

async fn assign(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignDriverRequest>,
) -> Result<Json<Value>, AppError> {
    let driver_id = payload
        .driver_id
        .ok_or_else(|| AppError::Validation("driver_id is required".to_string()))?;

    let order = assign_driver(&state, &actor, id, driver_id)?;
    Ok(Json(json!({
        "message": "Driver assigned successfully",
        "order": order,
    })))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let order = accept_order(&state, &actor, id)?;
    Ok(Json(json!({
        "message": "Order accepted successfully",
        "order": order,
    })))
}
