use std::env;

use rust_decimal::Decimal;

use crate::error::AppError;
use crate::geo::BoundingBox;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: String,
    pub notification_queue_size: usize,
    pub event_buffer_size: usize,
    pub public_base_url: String,
    pub pricing: PricingConfig,
    pub kopokopo: KopoKopoConfig,
    pub sms: SmsConfig,
    pub google_maps_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub within_metro: Decimal,
    pub outside_metro: Decimal,
    pub metro_area: BoundingBox,
}

#[derive(Debug, Clone)]
pub struct KopoKopoConfig {
    pub base_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub till_number: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub username: Option<String>,
    pub api_key: Option<String>,
    pub sender_id: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 8000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
            notification_queue_size: parse_or_default("NOTIFICATION_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            pricing: PricingConfig {
                within_metro: parse_or_default("PRICE_WITHIN_METRO", Decimal::from(150))?,
                outside_metro: parse_or_default("PRICE_OUTSIDE_METRO", Decimal::from(300))?,
                metro_area: BoundingBox {
                    min_lat: parse_or_default("METRO_MIN_LAT", -1.5)?,
                    max_lat: parse_or_default("METRO_MAX_LAT", -1.1)?,
                    min_lng: parse_or_default("METRO_MIN_LNG", 36.6)?,
                    max_lng: parse_or_default("METRO_MAX_LNG", 37.0)?,
                },
            },
            kopokopo: KopoKopoConfig {
                base_url: env::var("KOPOKOPO_BASE_URL")
                    .unwrap_or_else(|_| "https://api.kopokopo.com".to_string()),
                client_id: non_empty("KOPOKOPO_CLIENT_ID"),
                client_secret: non_empty("KOPOKOPO_CLIENT_SECRET"),
                till_number: env::var("KOPOKOPO_TILL_NUMBER")
                    .unwrap_or_else(|_| "K000000".to_string()),
                currency: env::var("KOPOKOPO_CURRENCY").unwrap_or_else(|_| "KES".to_string()),
            },
            sms: SmsConfig {
                username: non_empty("AFRICASTALKING_USERNAME"),
                api_key: non_empty("AFRICASTALKING_API_KEY"),
                sender_id: env::var("AFRICASTALKING_SENDER_ID")
                    .unwrap_or_else(|_| "PAKAHOME".to_string()),
            },
            google_maps_api_key: non_empty("GOOGLE_MAPS_API_KEY"),
        })
    }

    pub fn payment_callback_url(&self) -> String {
        format!(
            "{}/payments/callback",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
