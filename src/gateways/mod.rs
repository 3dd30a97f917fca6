//! Outbound integrations. Each provider sits behind an object-safe trait so the
//! engine can run against in-process fakes.

pub mod geocode;
pub mod kopokopo;
pub mod sms;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::geo::GeoPoint;

pub const USER_AGENT: &str = "PAKA-HOME/1.0";

#[derive(Debug, Clone)]
pub struct CollectionRequest {
    pub phone: String,
    pub amount: Decimal,
    pub order_reference: String,
    pub callback_url: String,
    pub payer_name: Option<String>,
}

/// Outcome of asking the provider to prompt the payer. Provider-side failures
/// are reported here, never as an `Err`.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionResult {
    pub success: bool,
    pub message: String,
    pub provider_request_id: Option<String>,
    pub error_details: Option<Value>,
}

impl CollectionResult {
    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            success: false,
            message: message.into(),
            provider_request_id: None,
            error_details: Some(details),
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate_collection(&self, request: CollectionRequest) -> CollectionResult;

    /// Checks a webhook signature against the raw request body. `false` when
    /// no shared secret is configured.
    fn verify_signature(&self, raw_body: &[u8], signature: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct SmsOutcome {
    pub delivered: bool,
    pub response: String,
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> SmsOutcome;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Option<GeoPoint>;
}
