use std::time::Instant;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::access::{require_customer, Actor};
use crate::error::AppError;
use crate::gateways::CollectionRequest;
use crate::models::payment::{Payment, PaymentStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct InitiatePayment {
    pub order_id: Uuid,
    pub phone_number: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitiatedPayment {
    pub message: String,
    pub checkout_request_id: Option<String>,
    pub payment: Payment,
}

/// Starts an STK push for the customer's order. The order itself only moves
/// once the provider's callback confirms the payment.
pub async fn initiate_payment(
    state: &AppState,
    actor: &Actor,
    request: InitiatePayment,
) -> Result<InitiatedPayment, AppError> {
    let customer_id = require_customer(actor, "initiate payments")?;

    let phone = request.phone_number.trim().to_string();
    if phone.is_empty() {
        return Err(AppError::Validation(
            "phone_number: this field is required".to_string(),
        ));
    }

    let payer_name = state
        .customers
        .get(&customer_id)
        .map(|customer| customer.full_name.clone())
        .ok_or_else(|| AppError::NotFound("customer profile not found".to_string()))?;

    let order_id = request.order_id;
    let (tracking_code, amount) = {
        let order = state
            .orders
            .get(&order_id)
            .filter(|order| order.customer_id == customer_id)
            .ok_or_else(|| AppError::NotFound("order not found".to_string()))?;

        let merchant_request_id = Uuid::new_v4().to_string();
        match state.payments.entry(order_id) {
            Entry::Occupied(mut slot) => {
                let payment = slot.get_mut();
                if payment.is_completed() {
                    return Err(AppError::Validation("order already paid".to_string()));
                }
                payment.phone_number = phone.clone();
                payment.status = PaymentStatus::Pending;
                payment.merchant_request_id = Some(merchant_request_id);
                payment.updated_at = Utc::now();
            }
            Entry::Vacant(slot) => {
                let mut payment = Payment::new(order_id, customer_id, phone.clone(), order.price);
                payment.merchant_request_id = Some(merchant_request_id);
                slot.insert(payment);
            }
        }

        (order.tracking_code.clone(), order.price)
    };

    let start = Instant::now();
    let result = state
        .payment_gateway
        .initiate_collection(CollectionRequest {
            phone,
            amount,
            order_reference: tracking_code.clone(),
            callback_url: state.payment_callback_url.clone(),
            payer_name: Some(payer_name),
        })
        .await;
    state
        .metrics
        .observe_gateway("payment", result.success, start.elapsed().as_secs_f64());

    let payment = {
        let mut payment = state
            .payments
            .get_mut(&order_id)
            .ok_or_else(|| AppError::Internal("payment vanished during initiation".to_string()))?;

        // The callback may already have settled it while the push was in flight.
        if !payment.is_completed() {
            if result.success {
                payment.status = PaymentStatus::Processing;
                payment.checkout_request_id = result.provider_request_id.clone();
            } else {
                payment.status = PaymentStatus::Failed;
                payment.result_description = result.message.clone();
            }
            payment.updated_at = Utc::now();
        }
        payment.clone()
    };

    if !result.success {
        warn!(
            order_id = %order_id,
            tracking_code = %tracking_code,
            message = %result.message,
            "payment initiation failed"
        );
        return Err(AppError::Gateway {
            message: result.message,
            details: Some(result.error_details.unwrap_or_else(|| json!({}))),
        });
    }

    info!(order_id = %order_id, tracking_code = %tracking_code, "payment initiated");
    Ok(InitiatedPayment {
        message: result.message,
        checkout_request_id: payment.checkout_request_id.clone(),
        payment,
    })
}
