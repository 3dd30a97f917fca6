use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Available,
    Busy,
    Offline,
}

impl DriverStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "available" => Some(DriverStatus::Available),
            "busy" => Some(DriverStatus::Busy),
            "offline" => Some(DriverStatus::Offline),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub license_number: String,
    pub vehicle_type: String,
    pub vehicle_registration: String,
    pub status: DriverStatus,
    pub location: Option<GeoPoint>,
    pub is_active: bool,
    /// Order this driver currently holds; set and cleared only by assignment.
    pub active_order: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
