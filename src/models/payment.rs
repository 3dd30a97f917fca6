use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub phone_number: String,
    pub amount: Decimal,
    pub mpesa_receipt_number: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub merchant_request_id: Option<String>,
    pub checkout_request_id: Option<String>,
    pub result_code: Option<String>,
    pub result_description: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(order_id: Uuid, customer_id: Uuid, phone_number: String, amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            customer_id,
            phone_number,
            amount,
            mpesa_receipt_number: None,
            transaction_date: None,
            merchant_request_id: None,
            checkout_request_id: None,
            result_code: None,
            result_description: String::new(),
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }
}
