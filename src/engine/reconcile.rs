//! Applies payment-provider callbacks to local state.
//!
//! The payment row is upserted through the map entry while the order's entry
//! lock is held, so retried or concurrent callbacks for one order serialize.
//! Only the callback that moves a payment into `completed` writes a tracking
//! row and queues the confirmation SMS.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::lifecycle::{notify_customer, publish_transition};
use crate::error::AppError;
use crate::gateways::kopokopo::parse_callback;
use crate::models::order::OrderStatus;
use crate::models::payment::{Payment, PaymentStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    /// Payment newly completed.
    Confirmed,
    /// Payment was already completed; receipt fields refreshed, nothing re-sent.
    AlreadyConfirmed,
    /// Payment marked failed.
    Failed,
    /// Failure reported for a payment that had already completed; ignored.
    FailureIgnored,
}

impl CallbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackOutcome::Confirmed => "confirmed",
            CallbackOutcome::AlreadyConfirmed => "already_confirmed",
            CallbackOutcome::Failed => "failed",
            CallbackOutcome::FailureIgnored => "failure_ignored",
        }
    }
}

/// A missing signature is accepted; a present but wrong one is not.
pub fn handle_payment_callback(
    state: &AppState,
    raw_body: &[u8],
    signature: Option<&str>,
) -> Result<CallbackOutcome, AppError> {
    let outcome = reconcile(state, raw_body, signature);

    let label = match &outcome {
        Ok(outcome) => outcome.as_str(),
        Err(err) => err.code(),
    };
    state
        .metrics
        .payment_callbacks_total
        .with_label_values(&[label])
        .inc();

    outcome
}

fn reconcile(
    state: &AppState,
    raw_body: &[u8],
    signature: Option<&str>,
) -> Result<CallbackOutcome, AppError> {
    match signature {
        Some(signature) => {
            if !state.payment_gateway.verify_signature(raw_body, signature) {
                warn!("payment callback signature rejected");
                return Err(AppError::Unauthorized("invalid signature".to_string()));
            }
        }
        None => warn!("payment callback arrived without a signature"),
    }

    let result = parse_callback(raw_body)?;

    let order_id = state
        .tracking_codes
        .get(&result.order_reference)
        .map(|entry| *entry.value())
        .ok_or_else(|| {
            AppError::NotFound(format!("order {} not found", result.order_reference))
        })?;

    let mut order = state
        .orders
        .get_mut(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", result.order_reference)))?;

    let mut payment = state.payments.entry(order_id).or_insert_with(|| {
        info!(order_id = %order_id, "payment row created from callback");
        Payment::new(
            order_id,
            order.customer_id,
            result.payer_phone.clone().unwrap_or_default(),
            order.price,
        )
    });

    let now = Utc::now();

    if !result.success {
        if payment.is_completed() {
            warn!(
                order_id = %order_id,
                "failure callback for a completed payment ignored"
            );
            return Ok(CallbackOutcome::FailureIgnored);
        }

        payment.status = PaymentStatus::Failed;
        payment.result_code = Some(result.provider_status.clone());
        payment.result_description = result.error_message.clone().unwrap_or_default();
        payment.updated_at = now;

        info!(
            order_id = %order_id,
            tracking_code = %order.tracking_code,
            reason = %payment.result_description,
            "payment failed"
        );
        return Ok(CallbackOutcome::Failed);
    }

    if let Some(receipt) = &result.receipt {
        payment.mpesa_receipt_number = Some(receipt.clone());
    }
    if let Some(time) = result.transaction_time {
        payment.transaction_date = Some(time);
    }
    payment.updated_at = now;

    if payment.is_completed() {
        info!(order_id = %order_id, "duplicate payment confirmation; no changes to order");
        return Ok(CallbackOutcome::AlreadyConfirmed);
    }

    if result.receipt.is_none() {
        warn!(order_id = %order_id, "successful callback carried no receipt reference");
    }
    payment.status = PaymentStatus::Completed;
    payment.result_code = Some(result.provider_status.clone());
    payment.result_description = "Payment confirmed".to_string();
    let amount = payment.amount;
    let receipt = payment.mpesa_receipt_number.clone().unwrap_or_default();
    drop(payment);

    let entry = if matches!(
        order.status,
        OrderStatus::PendingPayment | OrderStatus::PendingAssignment
    ) {
        order.status = OrderStatus::PendingAssignment;
        order.updated_at = now;
        Some(order.append_tracking(
            format!("Payment confirmed. Receipt: {receipt}"),
            None,
        ))
    } else {
        warn!(
            order_id = %order_id,
            status = %order.status,
            "payment confirmed for an order past payment; status left unchanged"
        );
        None
    };
    let snapshot = order.clone();
    drop(order);

    info!(
        order_id = %snapshot.id,
        tracking_code = %snapshot.tracking_code,
        receipt = %receipt,
        "payment confirmed"
    );
    if let Some(entry) = entry {
        publish_transition(state, &snapshot, entry);
    }
    notify_customer(
        state,
        &snapshot,
        format!(
            "Payment of KES {amount} for order {} confirmed. Receipt: {receipt}",
            snapshot.tracking_code
        ),
    );

    Ok(CallbackOutcome::Confirmed)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::{handle_payment_callback, CallbackOutcome};
    use crate::access::Actor;
    use crate::engine::lifecycle::{create_order, NewOrder};
    use crate::error::AppError;
    use crate::models::customer::Customer;
    use crate::models::order::{ContactPoint, Order, OrderStatus};
    use crate::models::payment::PaymentStatus;
    use crate::state::AppState;
    use crate::testkit::{callback_body, test_state, FakePaymentGateway, FixedGeocoder};

    async fn placed_order(state: &AppState) -> Order {
        let customer = Customer {
            id: Uuid::new_v4(),
            full_name: "Amina Otieno".to_string(),
            email: "amina@example.com".to_string(),
            phone: "0712345678".to_string(),
            address: String::new(),
            created_at: Utc::now(),
        };
        let actor = Actor::Customer(customer.id);
        state.customers.insert(customer.id, customer);

        let stop = |address: &str| ContactPoint {
            name: "Amina".to_string(),
            phone: "0712345678".to_string(),
            address: address.to_string(),
            location: None,
        };
        create_order(
            state,
            &actor,
            NewOrder {
                pickup: stop("Moi Avenue"),
                delivery: stop("Ngong Road"),
                parcel_description: String::new(),
                parcel_weight: None,
                special_instructions: String::new(),
            },
        )
        .await
        .unwrap()
    }

    fn body(reference: &str, receipt: Option<&str>) -> Vec<u8> {
        serde_json::to_vec(&callback_body(reference, receipt)).unwrap()
    }

    #[tokio::test]
    async fn confirmation_moves_order_and_is_idempotent() {
        let (state, mut rx) = test_state(
            Arc::new(FakePaymentGateway::accepting()),
            FixedGeocoder::default(),
        );
        let order = placed_order(&state).await;
        let raw = body(&order.tracking_code, Some("QKJ1"));

        let first = handle_payment_callback(&state, &raw, None).unwrap();
        let second = handle_payment_callback(&state, &raw, None).unwrap();

        assert_eq!(first, CallbackOutcome::Confirmed);
        assert_eq!(second, CallbackOutcome::AlreadyConfirmed);

        let stored = state.orders.get(&order.id).unwrap().clone();
        assert_eq!(stored.status, OrderStatus::PendingAssignment);
        assert_eq!(stored.tracking_logs.len(), 2);
        assert_eq!(stored.tracking_logs[1].description, "Payment confirmed. Receipt: QKJ1");

        let payment = state.payments.get(&order.id).unwrap().clone();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.amount, order.price);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failure_leaves_order_pending_payment() {
        let (state, _rx) = test_state(
            Arc::new(FakePaymentGateway::accepting()),
            FixedGeocoder::default(),
        );
        let order = placed_order(&state).await;

        let outcome = handle_payment_callback(&state, &body(&order.tracking_code, None), None);

        assert_eq!(outcome.unwrap(), CallbackOutcome::Failed);
        assert_eq!(
            state.payments.get(&order.id).unwrap().status,
            PaymentStatus::Failed
        );
        assert_eq!(
            state.orders.get(&order.id).unwrap().status,
            OrderStatus::PendingPayment
        );
    }

    #[tokio::test]
    async fn failure_after_confirmation_is_ignored() {
        let (state, _rx) = test_state(
            Arc::new(FakePaymentGateway::accepting()),
            FixedGeocoder::default(),
        );
        let order = placed_order(&state).await;
        handle_payment_callback(&state, &body(&order.tracking_code, Some("QKJ2")), None).unwrap();

        let outcome = handle_payment_callback(&state, &body(&order.tracking_code, None), None);

        assert_eq!(outcome.unwrap(), CallbackOutcome::FailureIgnored);
        assert!(state.payments.get(&order.id).unwrap().is_completed());
    }

    #[tokio::test]
    async fn wrong_signature_is_rejected_before_parsing() {
        let (state, _rx) = test_state(
            Arc::new(FakePaymentGateway::accepting().with_secret("k2-secret")),
            FixedGeocoder::default(),
        );

        let err = handle_payment_callback(&state, b"{not json", Some("00ff")).unwrap_err();

        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn unknown_reference_is_not_found() {
        let (state, _rx) = test_state(
            Arc::new(FakePaymentGateway::accepting()),
            FixedGeocoder::default(),
        );

        let err = handle_payment_callback(&state, &body("PAKA00000000", Some("R")), None)
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert!(state.payments.is_empty());
    }
}
