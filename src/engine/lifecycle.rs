//! Order lifecycle.
//!
//! ```text
//! pending_payment → pending_assignment → assigned → accepted → picked_up → delivered
//!        └──────────────── cancelled (from any non-terminal state) ───────────────┘
//! ```
//!
//! Every applied transition writes exactly one tracking row under the same
//! entry lock as the status change, then broadcasts it and queues one SMS.
//! Rejected transitions write nothing.

use std::time::Instant;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::access::{
    authorize_status_update, require_customer, require_customer_self_or_admin, require_driver, Actor,
};
use crate::engine::assignment::release_driver;
use crate::engine::notify::enqueue_notification;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::order::{ContactPoint, Order, OrderStatus, OrderTracking, TrackingEvent};
use crate::state::{claim_unique, AppState};

pub const TRACKING_PREFIX: &str = "PAKA";

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub pickup: ContactPoint,
    pub delivery: ContactPoint,
    #[serde(default)]
    pub parcel_description: String,
    #[serde(default)]
    pub parcel_weight: Option<Decimal>,
    #[serde(default)]
    pub special_instructions: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusUpdate {
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

pub async fn create_order(
    state: &AppState,
    actor: &Actor,
    request: NewOrder,
) -> Result<Order, AppError> {
    let customer_id = require_customer(actor, "create orders")?;
    if !state.customers.contains_key(&customer_id) {
        return Err(AppError::Forbidden(
            "customer profile not found".to_string(),
        ));
    }

    validate_contact("pickup", &request.pickup)?;
    validate_contact("delivery", &request.delivery)?;
    if let Some(weight) = request.parcel_weight {
        if weight <= Decimal::ZERO {
            return Err(AppError::Validation(
                "parcel_weight must be > 0".to_string(),
            ));
        }
    }

    let mut pickup = request.pickup;
    let mut delivery = request.delivery;
    locate(state, &mut pickup).await;
    locate(state, &mut delivery).await;

    let quote = state
        .pricing
        .quote_partial(pickup.location.as_ref(), delivery.location.as_ref());

    // Held until the order is stored so a concurrent account deletion either
    // runs first (and this fails) or sees the new order in its cascade.
    let owner = state.customers.get(&customer_id).ok_or_else(|| {
        AppError::Forbidden("customer profile not found".to_string())
    })?;

    let id = Uuid::new_v4();
    let tracking_code = reserve_tracking_code(state, id);
    let now = Utc::now();

    let mut order = Order {
        id,
        tracking_code,
        customer_id,
        driver_id: None,
        pickup,
        delivery,
        parcel_description: request.parcel_description,
        parcel_weight: request.parcel_weight,
        special_instructions: request.special_instructions,
        is_within_area: quote.is_within_area,
        price: quote.price,
        status: OrderStatus::PendingPayment,
        created_at: now,
        updated_at: now,
        picked_up_at: None,
        delivered_at: None,
        tracking_logs: Vec::new(),
    };
    let entry = order.append_tracking("Order created, awaiting payment", None);
    state.orders.insert(id, order.clone());
    drop(owner);

    info!(
        order_id = %order.id,
        tracking_code = %order.tracking_code,
        price = %order.price,
        within_area = order.is_within_area,
        "order created"
    );
    publish_transition(state, &order, entry);

    Ok(order)
}

/// Generic status change for admins and the assigned driver.
///
/// Only the role gate and the order's driver link are enforced; the source
/// status is not checked, so a replayed or backward move is applied as given.
pub fn update_status(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
    request: StatusUpdate,
) -> Result<Order, AppError> {
    let raw = request
        .status
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| AppError::Validation("status is required".to_string()))?;
    let target = OrderStatus::parse(raw)
        .ok_or_else(|| AppError::InvalidTransition(format!("unknown status {raw}")))?;

    let mut order = state
        .orders
        .get_mut(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    authorize_status_update(actor, &order, target)?;

    if target.requires_driver() && order.driver_id.is_none() {
        return Err(AppError::InvalidTransition(format!(
            "order {} has no driver; assign one before moving it to {target}",
            order.tracking_code
        )));
    }

    let previous = order.status;
    let now = Utc::now();
    order.status = target;
    order.updated_at = now;

    if matches!(
        target,
        OrderStatus::PickedUp | OrderStatus::InTransit | OrderStatus::Delivered
    ) && order.picked_up_at.is_none()
    {
        order.picked_up_at = Some(now);
    }
    if target == OrderStatus::Delivered && order.delivered_at.is_none() {
        order.delivered_at = Some(now);
    }

    if target.releases_driver() || !target.requires_driver() {
        if let Some(driver_id) = order.driver_id {
            release_driver(state, driver_id, order.id);
        }
        if !target.requires_driver() {
            order.driver_id = None;
        }
    }

    let description = request
        .description
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| format!("Status changed from {previous} to {target}"));
    let entry = order.append_tracking(description, request.location);
    let snapshot = order.clone();
    drop(order);

    info!(
        order_id = %snapshot.id,
        tracking_code = %snapshot.tracking_code,
        actor = actor.role(),
        from = %previous,
        to = %target,
        "order status updated"
    );
    publish_transition(state, &snapshot, entry);

    let code = &snapshot.tracking_code;
    let message = match target {
        OrderStatus::PickedUp => {
            format!("Your order {code} has been picked up and is on the way!")
        }
        OrderStatus::Delivered => {
            format!("Your order {code} has been delivered successfully. Thank you!")
        }
        OrderStatus::Accepted => format!("Your order {code} has been accepted by your driver."),
        other => format!("Your order {code} is now {}.", other.as_str().replace('_', " ")),
    };
    notify_customer(state, &snapshot, message);

    Ok(snapshot)
}

/// The assigned driver confirms they will take the order.
pub fn accept_order(state: &AppState, actor: &Actor, order_id: Uuid) -> Result<Order, AppError> {
    let driver_id = require_driver(actor, "accept orders")?;

    let mut order = state
        .orders
        .get_mut(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    if order.driver_id != Some(driver_id) {
        return Err(AppError::Forbidden(
            "order is not assigned to you".to_string(),
        ));
    }
    if order.status != OrderStatus::Assigned {
        return Err(AppError::InvalidTransition(format!(
            "order is {}, not assigned",
            order.status
        )));
    }

    let driver_name = state
        .drivers
        .get(&driver_id)
        .map(|driver| driver.full_name.clone())
        .unwrap_or_else(|| "your driver".to_string());

    order.status = OrderStatus::Accepted;
    order.updated_at = Utc::now();
    let entry = order.append_tracking(format!("Order accepted by driver {driver_name}"), None);
    let snapshot = order.clone();
    drop(order);

    info!(order_id = %snapshot.id, driver_id = %driver_id, "order accepted");
    publish_transition(state, &snapshot, entry);
    notify_customer(
        state,
        &snapshot,
        format!(
            "Driver {driver_name} has accepted your order {}. They will pick up soon!",
            snapshot.tracking_code
        ),
    );

    Ok(snapshot)
}

/// Removes a customer with their orders, tracking logs and payments. Drivers
/// holding any of those orders are released. Returns the number of orders removed.
pub fn delete_customer(
    state: &AppState,
    actor: &Actor,
    customer_id: Uuid,
) -> Result<usize, AppError> {
    require_customer_self_or_admin(actor, customer_id)?;

    let Some((_, customer)) = state.customers.remove(&customer_id) else {
        return Err(AppError::NotFound("customer not found".to_string()));
    };
    state.customer_emails.remove(&customer.email);

    let order_ids: Vec<Uuid> = state
        .orders
        .iter()
        .filter(|entry| entry.customer_id == customer_id)
        .map(|entry| entry.id)
        .collect();

    for order_id in &order_ids {
        if let Some((_, order)) = state.orders.remove(order_id) {
            if let Some(driver_id) = order.driver_id {
                release_driver(state, driver_id, order.id);
            }
            state.tracking_codes.remove(&order.tracking_code);
        }
        state.payments.remove(order_id);
    }

    info!(customer_id = %customer_id, orders = order_ids.len(), "customer deleted");
    Ok(order_ids.len())
}

/// Counts the transition and pushes the new tracking row to live subscribers.
pub(crate) fn publish_transition(state: &AppState, order: &Order, entry: OrderTracking) {
    state
        .metrics
        .order_transitions_total
        .with_label_values(&[order.status.as_str()])
        .inc();

    let _ = state.tracking_events_tx.send(TrackingEvent {
        order_id: order.id,
        tracking_code: order.tracking_code.clone(),
        entry,
    });
}

pub(crate) fn notify_customer(state: &AppState, order: &Order, message: String) {
    let phone = state
        .customers
        .get(&order.customer_id)
        .map(|customer| customer.phone.clone());

    match phone {
        Some(phone) => enqueue_notification(state, &phone, message, Some(order.id)),
        None => warn!(order_id = %order.id, "customer missing; notification skipped"),
    }
}

pub fn generate_tracking_code() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{TRACKING_PREFIX}{}", hex[..8].to_uppercase())
}

fn reserve_tracking_code(state: &AppState, order_id: Uuid) -> String {
    loop {
        let code = generate_tracking_code();
        if claim_unique(&state.tracking_codes, &code, order_id) {
            return code;
        }
    }
}

fn validate_contact(label: &str, contact: &ContactPoint) -> Result<(), AppError> {
    if contact.address.trim().is_empty() {
        return Err(AppError::Validation(
            "both pickup and delivery addresses are required".to_string(),
        ));
    }
    if contact.name.trim().is_empty() {
        return Err(AppError::Validation(format!("{label} name cannot be empty")));
    }
    if contact.phone.trim().is_empty() {
        return Err(AppError::Validation(format!("{label} phone cannot be empty")));
    }
    if let Some(point) = &contact.location {
        let valid = point.lat.is_finite()
            && point.lng.is_finite()
            && (-90.0..=90.0).contains(&point.lat)
            && (-180.0..=180.0).contains(&point.lng);
        if !valid {
            return Err(AppError::Validation(format!(
                "{label} coordinates are out of range"
            )));
        }
    }
    Ok(())
}

async fn locate(state: &AppState, contact: &mut ContactPoint) {
    if contact.location.is_some() {
        return;
    }

    let start = Instant::now();
    let found = state.geocoder.geocode(&contact.address).await;
    state
        .metrics
        .observe_gateway("geocode", found.is_some(), start.elapsed().as_secs_f64());

    if found.is_none() {
        warn!(address = %contact.address, "address could not be geocoded");
    }
    contact.location = found;
}
