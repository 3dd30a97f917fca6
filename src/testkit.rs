//! In-process stand-ins for the external providers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tokio::sync::mpsc;

use crate::gateways::kopokopo::verify_hmac_sha256;
use crate::gateways::{
    CollectionRequest, CollectionResult, Geocoder, PaymentGateway, SmsGateway, SmsOutcome,
};
use crate::geo::GeoPoint;
use crate::models::notification::Notification;
use crate::state::{AppState, Collaborators, StateSettings};

#[derive(Default)]
pub struct FakePaymentGateway {
    secret: Option<String>,
    rejection: Option<String>,
    requests: Mutex<Vec<CollectionRequest>>,
}

impl FakePaymentGateway {
    pub fn accepting() -> Self {
        Self::default()
    }

    pub fn rejecting(message: &str) -> Self {
        Self {
            rejection: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = Some(secret.to_string());
        self
    }

    pub fn requests(&self) -> Vec<CollectionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Hex HMAC-SHA256 of `body` under this gateway's secret.
    pub fn sign(&self, body: &[u8]) -> String {
        let secret = self.secret.as_deref().unwrap_or_default();
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
            return String::new();
        };
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn initiate_collection(&self, request: CollectionRequest) -> CollectionResult {
        let count = match self.requests.lock() {
            Ok(mut requests) => {
                requests.push(request);
                requests.len()
            }
            Err(_) => 0,
        };

        match &self.rejection {
            Some(message) => CollectionResult::failure(
                format!("Failed to initiate payment: {message}"),
                json!({ "error_code": 400, "error_message": message }),
            ),
            None => CollectionResult {
                success: true,
                message: "Payment request sent. Please check your phone to complete payment."
                    .to_string(),
                provider_request_id: Some(format!("req-{count}")),
                error_details: None,
            },
        }
    }

    fn verify_signature(&self, raw_body: &[u8], signature: &str) -> bool {
        verify_hmac_sha256(self.secret.as_deref(), raw_body, signature)
    }
}

pub struct RecordingSms {
    delivered: bool,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSms {
    pub fn delivering() -> Self {
        Self {
            delivered: true,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            delivered: false,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SmsGateway for RecordingSms {
    async fn send(&self, phone: &str, message: &str) -> SmsOutcome {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((phone.to_string(), message.to_string()));
        }
        SmsOutcome {
            delivered: self.delivered,
            response: if self.delivered {
                "Sent".to_string()
            } else {
                "provider timeout".to_string()
            },
        }
    }
}

#[derive(Default)]
pub struct FixedGeocoder {
    points: HashMap<String, GeoPoint>,
}

impl FixedGeocoder {
    pub fn with(mut self, address: &str, lat: f64, lng: f64) -> Self {
        self.points.insert(address.to_string(), GeoPoint { lat, lng });
        self
    }
}

#[async_trait]
impl Geocoder for FixedGeocoder {
    async fn geocode(&self, address: &str) -> Option<GeoPoint> {
        self.points.get(address).copied()
    }
}

pub fn test_state(
    gateway: Arc<FakePaymentGateway>,
    geocoder: FixedGeocoder,
) -> (Arc<AppState>, mpsc::Receiver<Notification>) {
    let (state, rx) = AppState::new(
        StateSettings::default(),
        Collaborators {
            payment_gateway: gateway,
            geocoder: Arc::new(geocoder),
        },
    );
    (Arc::new(state), rx)
}

/// Provider webhook body for an incoming-payment result.
pub fn callback_body(order_reference: &str, receipt: Option<&str>) -> Value {
    match receipt {
        Some(receipt) => json!({
            "data": {
                "id": "5af4c10a-f6de-4ac8-840d-42cb65454216",
                "type": "incoming_payment",
                "attributes": {
                    "initiation_time": "2024-03-01T13:15:00.000+03:00",
                    "status": "Success",
                    "event": {
                        "type": "Incoming Payment Request",
                        "resource": {
                            "id": "1f7e2b9b-7bd1-4ec2-9c3c-7e2e2d9d0b11",
                            "reference": receipt,
                            "origination_time": "2024-03-01T13:15:30.000+03:00",
                            "sender_phone_number": "+254712345678",
                            "amount": "150.0",
                            "currency": "KES",
                            "till_number": "K000000",
                            "status": "Received"
                        },
                        "errors": null
                    },
                    "metadata": {
                        "order_reference": order_reference,
                        "order_tracking_code": order_reference
                    }
                }
            }
        }),
        None => json!({
            "data": {
                "id": "6bf5d21b-07ef-4bd9-951e-53dc76565327",
                "type": "incoming_payment",
                "attributes": {
                    "status": "Failed",
                    "event": {
                        "type": "Incoming Payment Request",
                        "resource": null,
                        "errors": "Request cancelled by user"
                    },
                    "metadata": { "order_reference": order_reference }
                }
            }
        }),
    }
}
