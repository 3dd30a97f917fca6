use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub phone: String,
    pub message: String,
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SmsStatus {
    Sent,
    Failed,
}

/// One delivery attempt, recorded whatever the provider said.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsLog {
    pub id: Uuid,
    pub phone_number: String,
    pub message: String,
    pub order_id: Option<Uuid>,
    pub status: SmsStatus,
    pub response: String,
    pub created_at: DateTime<Utc>,
}
