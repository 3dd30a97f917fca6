use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::access::{require_admin, Actor};
use crate::engine::notify::enqueue_notification;
use crate::error::AppError;
use crate::models::notification::SmsLog;
use crate::state::AppState;

use super::json::Json;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications/sms", post(send_sms))
        .route("/notifications/sms-log", get(sms_log))
}

#[derive(Deserialize)]
pub struct SendSmsRequest {
    pub phone_number: Option<String>,
    pub message: Option<String>,
}

async fn send_sms(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<SendSmsRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_admin(&actor, "send SMS")?;

    let phone = payload.phone_number.as_deref().map(str::trim).unwrap_or_default();
    let message = payload.message.as_deref().map(str::trim).unwrap_or_default();
    if phone.is_empty() || message.is_empty() {
        return Err(AppError::Validation(
            "phone_number and message are required".to_string(),
        ));
    }

    enqueue_notification(&state, phone, message.to_string(), None);
    Ok((StatusCode::ACCEPTED, Json(json!({ "message": "SMS queued" }))))
}

async fn sms_log(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<SmsLog>>, AppError> {
    require_admin(&actor, "view the SMS log")?;

    let mut entries: Vec<SmsLog> = state
        .sms_log
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(entries))
}
