use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::gateways::SmsGateway;
use crate::models::notification::{Notification, SmsLog, SmsStatus};
use crate::state::AppState;

/// Queues an SMS without waiting. A full or closed queue drops the message;
/// the caller's transition has already been applied and stays applied.
pub fn enqueue_notification(
    state: &AppState,
    phone: &str,
    message: String,
    order_id: Option<Uuid>,
) {
    let notification = Notification {
        phone: phone.to_string(),
        message,
        order_id,
    };

    match state.notification_tx.try_send(notification) {
        Ok(()) => state.metrics.notifications_in_queue.inc(),
        Err(TrySendError::Full(dropped)) | Err(TrySendError::Closed(dropped)) => {
            warn!(
                phone = %dropped.phone,
                order_id = ?dropped.order_id,
                "notification queue unavailable; message dropped"
            );
            state
                .metrics
                .notifications_total
                .with_label_values(&["dropped"])
                .inc();
        }
    }
}

pub async fn run_notification_dispatcher(
    state: Arc<AppState>,
    sms: Arc<dyn SmsGateway>,
    mut notification_rx: mpsc::Receiver<Notification>,
) {
    info!("notification dispatcher started");

    while let Some(notification) = notification_rx.recv().await {
        state.metrics.notifications_in_queue.dec();
        deliver(&state, sms.as_ref(), notification).await;
    }

    warn!("notification dispatcher stopped: queue channel closed");
}

/// Sends one message and records the attempt in the SMS log.
pub async fn deliver(state: &AppState, sms: &dyn SmsGateway, notification: Notification) -> SmsLog {
    let start = Instant::now();
    let outcome = sms.send(&notification.phone, &notification.message).await;
    state
        .metrics
        .observe_gateway("sms", outcome.delivered, start.elapsed().as_secs_f64());

    let status = if outcome.delivered {
        SmsStatus::Sent
    } else {
        SmsStatus::Failed
    };

    let entry = SmsLog {
        id: Uuid::new_v4(),
        phone_number: notification.phone,
        message: notification.message,
        order_id: notification.order_id,
        status,
        response: outcome.response,
        created_at: Utc::now(),
    };
    state.sms_log.insert(entry.id, entry.clone());

    let label = if outcome.delivered { "sent" } else { "failed" };
    state
        .metrics
        .notifications_total
        .with_label_values(&[label])
        .inc();

    if outcome.delivered {
        info!(phone = %entry.phone_number, order_id = ?entry.order_id, "sms sent");
    } else {
        warn!(
            phone = %entry.phone_number,
            order_id = ?entry.order_id,
            response = %entry.response,
            "sms delivery failed"
        );
    }

    entry
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{deliver, enqueue_notification};
    use crate::models::notification::{Notification, SmsStatus};
    use crate::testkit::{test_state, FakePaymentGateway, FixedGeocoder, RecordingSms};

    fn notice() -> Notification {
        Notification {
            phone: "0712345678".to_string(),
            message: "Your order PAKA1234ABCD is now cancelled.".to_string(),
            order_id: None,
        }
    }

    #[tokio::test]
    async fn failed_delivery_is_still_logged() {
        let (state, _rx) = test_state(
            Arc::new(FakePaymentGateway::accepting()),
            FixedGeocoder::default(),
        );
        let sms = RecordingSms::failing();

        let entry = deliver(&state, &sms, notice()).await;

        assert_eq!(entry.status, SmsStatus::Failed);
        assert_eq!(entry.response, "provider timeout");
        assert_eq!(state.sms_log.len(), 1);
        assert_eq!(sms.sent().len(), 1);
    }

    #[tokio::test]
    async fn closed_queue_drops_without_blocking() {
        let (state, rx) = test_state(
            Arc::new(FakePaymentGateway::accepting()),
            FixedGeocoder::default(),
        );
        drop(rx);

        enqueue_notification(&state, "0712345678", "hello".to_string(), None);

        assert_eq!(state.metrics.notifications_in_queue.get(), 0);
        assert_eq!(
            state
                .metrics
                .notifications_total
                .with_label_values(&["dropped"])
                .get(),
            1
        );
    }
}
