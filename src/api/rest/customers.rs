use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::access::{require_customer_self_or_admin, Actor};
use crate::engine::lifecycle::delete_customer;
use crate::error::AppError;
use crate::models::customer::Customer;
use crate::state::{claim_unique, AppState};

use super::json::Json;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/customers", post(register_customer))
        .route("/customers/:id", get(get_customer).delete(remove_customer))
}

#[derive(Deserialize)]
pub struct RegisterCustomerRequest {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub address: String,
}

async fn register_customer(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterCustomerRequest>,
) -> Result<(StatusCode, Json<Customer>), AppError> {
    let full_name = payload.full_name.trim().to_string();
    let email = payload.email.trim().to_lowercase();
    let phone = payload.phone.trim().to_string();

    if full_name.is_empty() {
        return Err(AppError::Validation("full_name cannot be empty".to_string()));
    }
    if !email.contains('@') {
        return Err(AppError::Validation("email is not valid".to_string()));
    }
    if phone.is_empty() {
        return Err(AppError::Validation("phone cannot be empty".to_string()));
    }
    let id = Uuid::new_v4();
    if !claim_unique(&state.customer_emails, &email, id) {
        return Err(AppError::Validation(
            "a customer with this email already exists".to_string(),
        ));
    }

    let customer = Customer {
        id,
        full_name,
        email,
        phone,
        address: payload.address,
        created_at: Utc::now(),
    };

    state.customers.insert(customer.id, customer.clone());
    tracing::info!(customer_id = %customer.id, "customer registered");
    Ok((StatusCode::CREATED, Json(customer)))
}

async fn get_customer(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Customer>, AppError> {
    require_customer_self_or_admin(&actor, id)?;

    let customer = state
        .customers
        .get(&id)
        .ok_or_else(|| AppError::NotFound("customer not found".to_string()))?;

    Ok(Json(customer.value().clone()))
}

async fn remove_customer(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let deleted_orders = delete_customer(&state, &actor, id)?;
    Ok(Json(json!({
        "message": "Account deleted",
        "deleted_orders": deleted_orders,
    })))
}
