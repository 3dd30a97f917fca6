use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::access::{require_admin, require_driver_self_or_admin, Actor};
use crate::engine::assignment::{
    driver_consistency_violations, set_driver_status, DriverInconsistency, DriverStatusUpdate,
};
use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::order::Order;
use crate::state::{claim_unique, AppState};

use super::json::Json;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id/status", post(update_driver_status))
        .route("/drivers/:id/orders", get(driver_orders))
        .route("/admin/driver-consistency", get(consistency))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub full_name: String,
    pub phone: String,
    pub license_number: String,
    #[serde(default)]
    pub vehicle_type: String,
    #[serde(default)]
    pub vehicle_registration: String,
}

#[derive(Deserialize)]
pub struct ListDriversQuery {
    pub status: Option<String>,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<(StatusCode, Json<Driver>), AppError> {
    require_admin(&actor, "register drivers")?;

    let full_name = payload.full_name.trim().to_string();
    let phone = payload.phone.trim().to_string();
    let license_number = payload.license_number.trim().to_string();

    if full_name.is_empty() {
        return Err(AppError::Validation("full_name cannot be empty".to_string()));
    }
    if phone.is_empty() {
        return Err(AppError::Validation("phone cannot be empty".to_string()));
    }
    if license_number.is_empty() {
        return Err(AppError::Validation(
            "license_number cannot be empty".to_string(),
        ));
    }

    let id = Uuid::new_v4();
    if !claim_unique(&state.driver_phones, &phone, id) {
        return Err(AppError::Validation(
            "a driver with this phone number already exists".to_string(),
        ));
    }
    if !claim_unique(&state.driver_licenses, &license_number, id) {
        state.driver_phones.remove(&phone);
        return Err(AppError::Validation(
            "a driver with this license number already exists".to_string(),
        ));
    }

    let now = Utc::now();
    let driver = Driver {
        id,
        full_name,
        phone,
        license_number,
        vehicle_type: payload.vehicle_type,
        vehicle_registration: payload.vehicle_registration,
        status: DriverStatus::Offline,
        location: None,
        is_active: true,
        active_order: None,
        created_at: now,
        updated_at: now,
    };

    state.drivers.insert(driver.id, driver.clone());
    tracing::info!(driver_id = %driver.id, "driver registered");
    Ok((StatusCode::CREATED, Json(driver)))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<ListDriversQuery>,
) -> Result<Json<Vec<Driver>>, AppError> {
    require_admin(&actor, "view drivers")?;

    let wanted = match query.status.as_deref() {
        Some(raw) => Some(
            DriverStatus::parse(raw)
                .ok_or_else(|| AppError::InvalidStatus(format!("invalid driver status {raw}")))?,
        ),
        None => None,
    };

    let mut drivers: Vec<Driver> = state
        .drivers
        .iter()
        .filter(|entry| entry.is_active && wanted.is_none_or(|status| entry.status == status))
        .map(|entry| entry.value().clone())
        .collect();
    drivers.sort_by(|a, b| a.full_name.cmp(&b.full_name));

    Ok(Json(drivers))
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverStatusUpdate>,
) -> Result<Json<Value>, AppError> {
    let driver = set_driver_status(&state, &actor, id, payload)?;
    Ok(Json(json!({
        "message": "Status updated successfully",
        "driver": driver,
    })))
}

async fn driver_orders(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Order>>, AppError> {
    require_driver_self_or_admin(&actor, id)?;
    if !state.drivers.contains_key(&id) {
        return Err(AppError::NotFound("driver profile not found".to_string()));
    }

    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .filter(|entry| entry.driver_id == Some(id))
        .map(|entry| entry.value().clone())
        .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(orders))
}

async fn consistency(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<DriverInconsistency>>, AppError> {
    require_admin(&actor, "audit drivers")?;
    Ok(Json(driver_consistency_violations(&state)))
}
