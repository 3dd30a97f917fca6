//! Africa's Talking bulk messaging.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use tracing::warn;

use super::{SmsGateway, SmsOutcome, USER_AGENT};
use crate::config::SmsConfig;
use crate::error::AppError;

const MESSAGING_URL: &str = "https://api.africastalking.com/version1/messaging";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AfricasTalkingGateway {
    client: reqwest::Client,
    config: SmsConfig,
}

impl AfricasTalkingGateway {
    pub fn new(config: SmsConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl SmsGateway for AfricasTalkingGateway {
    async fn send(&self, phone: &str, message: &str) -> SmsOutcome {
        let (Some(username), Some(api_key)) = (&self.config.username, &self.config.api_key) else {
            return SmsOutcome {
                delivered: false,
                response: "API not configured".to_string(),
            };
        };

        let to = normalize_recipient(phone);
        let result = self
            .client
            .post(MESSAGING_URL)
            .header("apiKey", api_key)
            .header(ACCEPT, "application/json")
            .form(&[
                ("username", username.as_str()),
                ("to", to.as_str()),
                ("message", message),
                ("from", self.config.sender_id.as_str()),
            ])
            .timeout(SEND_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) => {
                let delivered = response.status().as_u16() == 201;
                let response = response.text().await.unwrap_or_default();
                SmsOutcome {
                    delivered,
                    response,
                }
            }
            Err(err) => {
                warn!(error = %err, "sms provider unreachable");
                SmsOutcome {
                    delivered: false,
                    response: err.to_string(),
                }
            }
        }
    }
}

/// The provider wants `254…` with no plus sign.
pub fn normalize_recipient(raw: &str) -> String {
    let phone: String = raw.chars().filter(|c| *c != '+' && *c != ' ').collect();

    if phone.starts_with("254") {
        phone
    } else if let Some(local) = phone.strip_prefix('0') {
        format!("254{local}")
    } else {
        format!("254{phone}")
    }
}
