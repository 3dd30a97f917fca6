//! KopoKopo M-Pesa STK push over the REST API.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{ACCEPT, LOCATION};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{error, info, warn};

use super::{CollectionRequest, CollectionResult, PaymentGateway, USER_AGENT};
use crate::config::KopoKopoConfig;
use crate::error::AppError;

pub const SIGNATURE_HEADER: &str = "x-kopokopo-signature";

const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);
const INITIATE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct KopoKopoGateway {
    client: reqwest::Client,
    config: KopoKopoConfig,
}

impl KopoKopoGateway {
    pub fn new(config: KopoKopoConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self { client, config })
    }

    async fn access_token(&self) -> Result<String, String> {
        let (Some(client_id), Some(client_secret)) =
            (&self.config.client_id, &self.config.client_secret)
        else {
            error!("kopokopo credentials not configured");
            return Err("credentials not configured".to_string());
        };

        let url = format!("{}/oauth/token", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .timeout(TOKEN_TIMEOUT)
            .send()
            .await
            .map_err(|err| format!("token request failed: {err}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "kopokopo token request rejected");
            return Err(format!("token request returned {status}"));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| format!("token response unreadable: {err}"))?;

        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "token response missing access_token".to_string())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Serialize)]
struct IncomingPaymentRequest<'a> {
    payment_channel: &'static str,
    till_number: &'a str,
    subscriber: Subscriber,
    amount: Amount<'a>,
    metadata: Metadata<'a>,
    #[serde(rename = "_links")]
    links: Links<'a>,
}

#[derive(Serialize)]
struct Subscriber {
    phone_number: String,
    first_name: String,
    last_name: String,
}

#[derive(Serialize)]
struct Amount<'a> {
    currency: &'a str,
    value: String,
}

#[derive(Serialize)]
struct Metadata<'a> {
    order_tracking_code: &'a str,
    order_reference: &'a str,
}

#[derive(Serialize)]
struct Links<'a> {
    callback_url: &'a str,
}

#[async_trait]
impl PaymentGateway for KopoKopoGateway {
    async fn initiate_collection(&self, request: CollectionRequest) -> CollectionResult {
        let token = match self.access_token().await {
            Ok(token) => token,
            Err(reason) => {
                return CollectionResult::failure(
                    "Failed to authenticate with the payment provider",
                    json!({ "error_type": "AUTH_ERROR", "error_message": reason }),
                );
            }
        };

        let (first_name, last_name) = split_name(request.payer_name.as_deref());
        let payload = IncomingPaymentRequest {
            payment_channel: "M-PESA STK Push",
            till_number: &self.config.till_number,
            subscriber: Subscriber {
                phone_number: normalize_msisdn(&request.phone),
                first_name,
                last_name,
            },
            amount: Amount {
                currency: &self.config.currency,
                value: format_amount(request.amount),
            },
            metadata: Metadata {
                order_tracking_code: &request.order_reference,
                order_reference: &request.order_reference,
            },
            links: Links {
                callback_url: &request.callback_url,
            },
        };

        let url = format!("{}/api/v1/incoming_payments", self.config.base_url);
        let response = match self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .json(&payload)
            .timeout(INITIATE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                error!(error = %err, order_reference = %request.order_reference, "stk push network error");
                return CollectionResult::failure(
                    format!("Network error: {err}"),
                    json!({ "error_type": "NETWORK_ERROR", "error_message": err.to_string() }),
                );
            }
        };

        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body_text = response.text().await.unwrap_or_default();
        let body: Value = serde_json::from_str(&body_text).unwrap_or(Value::Null);

        info!(status = %status, order_reference = %request.order_reference, "stk push response");

        if status.as_u16() == 201 {
            return CollectionResult {
                success: true,
                message: "Payment request sent. Please check your phone to complete payment."
                    .to_string(),
                provider_request_id: location.as_deref().and_then(request_id_from_location),
                error_details: None,
            };
        }

        let error_message = body["error_message"]
            .as_str()
            .unwrap_or("Unknown error")
            .to_string();
        let error_code = body
            .get("error_code")
            .cloned()
            .unwrap_or_else(|| json!(status.as_u16()));
        warn!(status = %status, error = %error_message, "stk push rejected");

        CollectionResult::failure(
            format!("Failed to initiate payment: {error_message}"),
            json!({
                "error_code": error_code,
                "error_message": error_message,
                "status_code": status.as_u16(),
                "full_response": body,
            }),
        )
    }

    fn verify_signature(&self, raw_body: &[u8], signature: &str) -> bool {
        verify_hmac_sha256(self.config.client_secret.as_deref(), raw_body, signature)
    }
}

/// Constant-time check of a hex HMAC-SHA256 of `raw_body`.
pub fn verify_hmac_sha256(secret: Option<&str>, raw_body: &[u8], signature: &str) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        warn!("webhook secret not configured; signature cannot be verified");
        return false;
    };

    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&expected).is_ok()
}

/// Canonical `+254…` form.
pub fn normalize_msisdn(raw: &str) -> String {
    let phone: String = raw.chars().filter(|c| *c != ' ' && *c != '-').collect();

    if phone.starts_with("+254") {
        phone
    } else if phone.starts_with("254") {
        format!("+{phone}")
    } else if let Some(local) = phone.strip_prefix('0') {
        format!("+254{local}")
    } else {
        format!("+254{phone}")
    }
}

/// `150.00` → `"150"`, `150.50` → `"150.5"`.
pub fn format_amount(amount: Decimal) -> String {
    amount.normalize().to_string()
}

fn split_name(name: Option<&str>) -> (String, String) {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return ("Customer".to_string(), String::new());
    };

    match name.split_once(' ') {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (name.to_string(), String::new()),
    }
}

fn request_id_from_location(location: &str) -> Option<String> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Normalized view of an incoming-payment result webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackResult {
    pub success: bool,
    pub order_reference: String,
    pub receipt: Option<String>,
    pub amount: Option<Decimal>,
    pub payer_phone: Option<String>,
    pub transaction_time: Option<DateTime<Utc>>,
    pub provider_status: String,
    pub error_message: Option<String>,
}

/// Parses `{data:{id, attributes:{status, event:{resource, errors}, metadata}}}`.
pub fn parse_callback(raw_body: &[u8]) -> Result<CallbackResult, AppError> {
    let payload: Value =
        serde_json::from_slice(raw_body).map_err(|_| AppError::MalformedCallback)?;
    if !payload.is_object() {
        return Err(AppError::MalformedCallback);
    }

    let data = &payload["data"];
    let attributes = &data["attributes"];
    let metadata = &attributes["metadata"];

    let order_reference = ["order_reference", "order_tracking_code"]
        .iter()
        .find_map(|key| metadata[*key].as_str())
        .map(str::trim)
        .filter(|reference| !reference.is_empty())
        .ok_or(AppError::OrderReferenceMissing)?
        .to_string();

    let provider_status = attributes["status"].as_str().unwrap_or("Unknown").to_string();
    let resource = &attributes["event"]["resource"];

    if provider_status == "Success" && resource.is_object() {
        let receipt = resource["reference"]
            .as_str()
            .or_else(|| resource["id"].as_str())
            .or_else(|| data["id"].as_str())
            .map(str::to_string);

        return Ok(CallbackResult {
            success: true,
            order_reference,
            receipt,
            amount: parse_amount(&resource["amount"]),
            payer_phone: resource["sender_phone_number"].as_str().map(str::to_string),
            transaction_time: resource["origination_time"]
                .as_str()
                .and_then(parse_timestamp),
            provider_status,
            error_message: None,
        });
    }

    let errors = &attributes["event"]["errors"];
    let error_message = match errors {
        Value::Null => "Payment request failed".to_string(),
        Value::String(text) if text.is_empty() => "Payment request failed".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };

    Ok(CallbackResult {
        success: false,
        order_reference,
        receipt: None,
        amount: None,
        payer_phone: None,
        transaction_time: None,
        provider_status,
        error_message: Some(error_message),
    })
}

fn parse_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(text) => Decimal::from_str(text.trim()).ok(),
        Value::Number(number) => Decimal::from_str(&number.to_string()).ok(),
        _ => None,
    }
}

/// ISO-8601 with `Z`, an explicit offset, or no zone (read as UTC).
/// Fractional seconds are optional. Anything else yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
