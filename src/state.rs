use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::engine::pricing::PricingRule;
use crate::gateways::{Geocoder, PaymentGateway};
use crate::models::customer::Customer;
use crate::models::driver::Driver;
use crate::models::notification::{Notification, SmsLog};
use crate::models::order::{Order, TrackingEvent};
use crate::models::payment::Payment;
use crate::observability::metrics::Metrics;

/// Process-wide store. When more than one map is locked at once the order is
/// always `customers` → `orders` → `drivers` → `payments`.
pub struct AppState {
    pub customers: DashMap<Uuid, Customer>,
    pub drivers: DashMap<Uuid, Driver>,
    /// Unique indexes, lower-cased email → customer and phone/license → driver.
    pub customer_emails: DashMap<String, Uuid>,
    pub driver_phones: DashMap<String, Uuid>,
    pub driver_licenses: DashMap<String, Uuid>,
    pub orders: DashMap<Uuid, Order>,
    /// Tracking code → order id.
    pub tracking_codes: DashMap<String, Uuid>,
    /// Keyed by order id; at most one payment per order.
    pub payments: DashMap<Uuid, Payment>,
    pub sms_log: DashMap<Uuid, SmsLog>,
    pub pricing: PricingRule,
    pub payment_gateway: Arc<dyn PaymentGateway>,
    pub geocoder: Arc<dyn Geocoder>,
    pub payment_callback_url: String,
    pub notification_tx: mpsc::Sender<Notification>,
    pub tracking_events_tx: broadcast::Sender<TrackingEvent>,
    pub metrics: Metrics,
}

#[derive(Debug, Clone)]
pub struct StateSettings {
    pub pricing: PricingRule,
    pub payment_callback_url: String,
    pub notification_queue_size: usize,
    pub event_buffer_size: usize,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            pricing: PricingRule::default(),
            payment_callback_url: "http://localhost:8000/payments/callback".to_string(),
            notification_queue_size: 1024,
            event_buffer_size: 1024,
        }
    }
}

pub struct Collaborators {
    pub payment_gateway: Arc<dyn PaymentGateway>,
    pub geocoder: Arc<dyn Geocoder>,
}

impl AppState {
    pub fn new(
        settings: StateSettings,
        collaborators: Collaborators,
    ) -> (Self, mpsc::Receiver<Notification>) {
        let (notification_tx, notification_rx) = mpsc::channel(settings.notification_queue_size);
        let (tracking_events_tx, _unused_rx) = broadcast::channel(settings.event_buffer_size);

        (
            Self {
                customers: DashMap::new(),
                drivers: DashMap::new(),
                customer_emails: DashMap::new(),
                driver_phones: DashMap::new(),
                driver_licenses: DashMap::new(),
                orders: DashMap::new(),
                tracking_codes: DashMap::new(),
                payments: DashMap::new(),
                sms_log: DashMap::new(),
                pricing: settings.pricing,
                payment_gateway: collaborators.payment_gateway,
                geocoder: collaborators.geocoder,
                payment_callback_url: settings.payment_callback_url,
                notification_tx,
                tracking_events_tx,
                metrics: Metrics::new(),
            },
            notification_rx,
        )
    }
}

/// Claims `key` in a unique index for `owner`. Returns false when another
/// owner already holds it.
pub fn claim_unique(index: &DashMap<String, Uuid>, key: &str, owner: Uuid) -> bool {
    match index.entry(key.to_string()) {
        Entry::Vacant(slot) => {
            slot.insert(owner);
            true
        }
        Entry::Occupied(_) => false,
    }
}
