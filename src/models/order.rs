use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    PendingAssignment,
    Assigned,
    Accepted,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::PendingPayment,
        OrderStatus::PendingAssignment,
        OrderStatus::Assigned,
        OrderStatus::Accepted,
        OrderStatus::PickedUp,
        OrderStatus::InTransit,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::PendingAssignment => "pending_assignment",
            OrderStatus::Assigned => "assigned",
            OrderStatus::Accepted => "accepted",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == raw.trim())
    }

    /// Statuses in which the order must reference a driver.
    pub fn requires_driver(&self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned
                | OrderStatus::Accepted
                | OrderStatus::PickedUp
                | OrderStatus::InTransit
                | OrderStatus::Delivered
        )
    }

    /// Statuses a driver may move their own order into.
    pub fn is_driver_target(&self) -> bool {
        matches!(
            self,
            OrderStatus::Accepted | OrderStatus::PickedUp | OrderStatus::Delivered
        )
    }

    /// Statuses after which the driver no longer holds the order.
    pub fn releases_driver(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One end of a delivery: who to meet, where. Coordinates travel as flat
/// `lat`/`lng` fields; a pair that is absent or incomplete reads as unlocated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactPoint {
    pub name: String,
    pub phone: String,
    pub address: String,
    #[serde(flatten)]
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTracking {
    pub id: Uuid,
    pub status: String,
    pub location: Option<GeoPoint>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub tracking_code: String,
    pub customer_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup: ContactPoint,
    pub delivery: ContactPoint,
    pub parcel_description: String,
    pub parcel_weight: Option<Decimal>,
    pub special_instructions: String,
    pub is_within_area: bool,
    pub price: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    /// Append-only, oldest first.
    pub tracking_logs: Vec<OrderTracking>,
}

impl Order {
    pub fn append_tracking(
        &mut self,
        description: impl Into<String>,
        location: Option<GeoPoint>,
    ) -> OrderTracking {
        let entry = OrderTracking {
            id: Uuid::new_v4(),
            status: self.status.as_str().to_string(),
            location,
            description: description.into(),
            created_at: Utc::now(),
        };
        self.tracking_logs.push(entry.clone());
        entry
    }
}

/// Broadcast to live tracking subscribers whenever a tracking row is appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub order_id: Uuid,
    pub tracking_code: String,
    pub entry: OrderTracking,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn contact_point_reads_flat_coordinates() {
        let point: ContactPoint = serde_json::from_value(json!({
            "name": "Amina",
            "phone": "0712345678",
            "address": "Kilimani",
            "lat": -1.29,
            "lng": 36.78,
        }))
        .unwrap();

        assert_eq!(point.location, Some(GeoPoint { lat: -1.29, lng: 36.78 }));
    }

    #[test]
    fn contact_point_without_full_pair_is_unlocated() {
        let missing: ContactPoint = serde_json::from_value(json!({
            "name": "Amina",
            "phone": "0712345678",
            "address": "Kilimani",
        }))
        .unwrap();
        let half: ContactPoint = serde_json::from_value(json!({
            "name": "Amina",
            "phone": "0712345678",
            "address": "Kilimani",
            "lat": -1.29,
        }))
        .unwrap();

        assert!(missing.location.is_none());
        assert!(half.location.is_none());
    }

    #[test]
    fn contact_point_writes_flat_coordinates() {
        let point = ContactPoint {
            name: "Amina".to_string(),
            phone: "0712345678".to_string(),
            address: "Kilimani".to_string(),
            location: Some(GeoPoint { lat: -1.29, lng: 36.78 }),
        };

        let value = serde_json::to_value(&point).unwrap();
        assert_eq!(value["lat"], -1.29);
        assert_eq!(value["lng"], 36.78);
        assert!(value.get("location").is_none());
    }
}
