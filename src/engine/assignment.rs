use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::access::{require_admin, require_driver_self, Actor};
use crate::engine::lifecycle::publish_transition;
use crate::engine::notify::enqueue_notification;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriverStatusUpdate {
    pub status: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Admin hands a paid order to an available driver.
///
/// The availability check and the `busy` write happen under the driver's
/// entry lock, itself taken while the order's entry lock is held, so two
/// concurrent assignments cannot both claim the same driver.
pub fn assign_driver(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
    driver_id: Uuid,
) -> Result<Order, AppError> {
    require_admin(actor, "assign drivers")?;

    let mut order = state
        .orders
        .get_mut(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    if order.status != OrderStatus::PendingAssignment {
        return Err(AppError::InvalidTransition(format!(
            "order is {}, only pending_assignment orders can be assigned",
            order.status
        )));
    }

    let mut driver = state
        .drivers
        .get_mut(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    if !driver.is_active
        || driver.status != DriverStatus::Available
        || driver.active_order.is_some()
    {
        warn!(
            order_id = %order_id,
            driver_id = %driver_id,
            driver_status = ?driver.status,
            active_order = ?driver.active_order,
            "assignment rejected: driver unavailable"
        );
        return Err(AppError::DriverUnavailable(
            "driver is not available".to_string(),
        ));
    }

    let now = Utc::now();
    driver.status = DriverStatus::Busy;
    driver.active_order = Some(order_id);
    driver.updated_at = now;
    let driver_name = driver.full_name.clone();
    let driver_phone = driver.phone.clone();
    drop(driver);

    order.driver_id = Some(driver_id);
    order.status = OrderStatus::Assigned;
    order.updated_at = now;
    let entry = order.append_tracking(format!("Order assigned to driver {driver_name}"), None);
    let snapshot = order.clone();
    drop(order);

    info!(
        order_id = %snapshot.id,
        tracking_code = %snapshot.tracking_code,
        driver_id = %driver_id,
        "driver assigned"
    );
    publish_transition(state, &snapshot, entry);
    enqueue_notification(
        state,
        &driver_phone,
        format!(
            "New order {} assigned to you. Pickup: {}",
            snapshot.tracking_code, snapshot.pickup.address
        ),
        Some(snapshot.id),
    );

    Ok(snapshot)
}

/// Driver self-reports availability and position. The stored status is
/// advisory; it is not reconciled against the driver's active order here.
pub fn set_driver_status(
    state: &AppState,
    actor: &Actor,
    driver_id: Uuid,
    update: DriverStatusUpdate,
) -> Result<Driver, AppError> {
    require_driver_self(actor, driver_id)?;

    let status = match update.status.as_deref() {
        Some(raw) => Some(
            DriverStatus::parse(raw)
                .ok_or_else(|| AppError::InvalidStatus(format!("invalid driver status {raw}")))?,
        ),
        None => None,
    };

    let mut driver = state
        .drivers
        .get_mut(&driver_id)
        .ok_or_else(|| AppError::NotFound("driver profile not found".to_string()))?;

    if let Some(status) = status {
        driver.status = status;
    }
    if let (Some(lat), Some(lng)) = (update.latitude, update.longitude) {
        driver.location = Some(GeoPoint { lat, lng });
    }
    driver.updated_at = Utc::now();

    info!(driver_id = %driver_id, status = ?driver.status, "driver status updated");
    Ok(driver.clone())
}

/// Frees `driver_id` if it is holding `order_id`. Called with the order's
/// entry lock held.
pub(crate) fn release_driver(state: &AppState, driver_id: Uuid, order_id: Uuid) {
    let Some(mut driver) = state.drivers.get_mut(&driver_id) else {
        return;
    };

    if driver.active_order == Some(order_id) {
        driver.active_order = None;
        driver.status = DriverStatus::Available;
        driver.updated_at = Utc::now();
        info!(driver_id = %driver_id, order_id = %order_id, "driver released");
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverInconsistency {
    pub driver_id: Uuid,
    pub stored_status: DriverStatus,
    pub active_order: Option<Uuid>,
    pub holding_orders: Vec<Uuid>,
}

/// Drivers whose stored availability disagrees with the orders they hold.
///
/// A driver is consistent when it is `busy` exactly while it holds one
/// assigned-but-undelivered order, and `active_order` names that order.
pub fn driver_consistency_violations(state: &AppState) -> Vec<DriverInconsistency> {
    let drivers: Vec<(Uuid, DriverStatus, Option<Uuid>)> = state
        .drivers
        .iter()
        .map(|entry| (entry.id, entry.status, entry.active_order))
        .collect();

    let mut holding: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for entry in state.orders.iter() {
        let order = entry.value();
        if let Some(driver_id) = order.driver_id {
            if order.status.requires_driver() && !order.status.releases_driver() {
                holding.entry(driver_id).or_default().push(order.id);
            }
        }
    }

    drivers
        .into_iter()
        .filter_map(|(driver_id, stored_status, active_order)| {
            let holding_orders = holding.remove(&driver_id).unwrap_or_default();
            let busy = stored_status == DriverStatus::Busy;
            let consistent = match holding_orders.as_slice() {
                [] => !busy && active_order.is_none(),
                [only] => busy && active_order == Some(*only),
                _ => false,
            };

            (!consistent).then_some(DriverInconsistency {
                driver_id,
                stored_status,
                active_order,
                holding_orders,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::{assign_driver, driver_consistency_violations, release_driver};
    use crate::access::Actor;
    use crate::engine::lifecycle::generate_tracking_code;
    use crate::error::AppError;
    use crate::models::driver::{Driver, DriverStatus};
    use crate::models::order::{ContactPoint, Order, OrderStatus};
    use crate::state::AppState;
    use crate::testkit::{test_state, FakePaymentGateway, FixedGeocoder};

    fn state() -> Arc<AppState> {
        test_state(
            Arc::new(FakePaymentGateway::accepting()),
            FixedGeocoder::default(),
        )
        .0
    }

    fn add_driver(state: &AppState, status: DriverStatus) -> Uuid {
        let now = Utc::now();
        let driver = Driver {
            id: Uuid::new_v4(),
            full_name: "Brian Kamau".to_string(),
            phone: "0733000001".to_string(),
            license_number: format!("DL-{}", Uuid::new_v4().simple()),
            vehicle_type: "motorcycle".to_string(),
            vehicle_registration: "KMDA 123A".to_string(),
            status,
            location: None,
            is_active: true,
            active_order: None,
            created_at: now,
            updated_at: now,
        };
        let id = driver.id;
        state.drivers.insert(id, driver);
        id
    }

    fn add_order(state: &AppState, status: OrderStatus) -> Uuid {
        let stop = ContactPoint {
            name: "Amina".to_string(),
            phone: "0712345678".to_string(),
            address: "Moi Avenue".to_string(),
            location: None,
        };
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            tracking_code: generate_tracking_code(),
            customer_id: Uuid::new_v4(),
            driver_id: None,
            pickup: stop.clone(),
            delivery: stop,
            parcel_description: String::new(),
            parcel_weight: None,
            special_instructions: String::new(),
            is_within_area: true,
            price: 150.into(),
            status,
            created_at: now,
            updated_at: now,
            picked_up_at: None,
            delivered_at: None,
            tracking_logs: Vec::new(),
        };
        let id = order.id;
        state.tracking_codes.insert(order.tracking_code.clone(), id);
        state.orders.insert(id, order);
        id
    }

    #[test]
    fn assignment_claims_driver_once() {
        let state = state();
        let admin = Actor::Admin(Uuid::new_v4());
        let driver = add_driver(&state, DriverStatus::Available);
        let first = add_order(&state, OrderStatus::PendingAssignment);
        let second = add_order(&state, OrderStatus::PendingAssignment);

        let assigned = assign_driver(&state, &admin, first, driver).unwrap();
        assert_eq!(assigned.status, OrderStatus::Assigned);
        assert_eq!(assigned.tracking_logs.len(), 1);

        let err = assign_driver(&state, &admin, second, driver).unwrap_err();
        assert!(matches!(err, AppError::DriverUnavailable(_)));
        assert_eq!(state.drivers.get(&driver).unwrap().active_order, Some(first));
        assert!(driver_consistency_violations(&state).is_empty());
    }

    #[test]
    fn offline_driver_is_unavailable() {
        let state = state();
        let driver = add_driver(&state, DriverStatus::Offline);
        let order = add_order(&state, OrderStatus::PendingAssignment);

        let err = assign_driver(&state, &Actor::Admin(Uuid::new_v4()), order, driver).unwrap_err();

        assert!(matches!(err, AppError::DriverUnavailable(_)));
        assert!(state.orders.get(&order).unwrap().tracking_logs.is_empty());
    }

    #[test]
    fn only_admins_assign() {
        let state = state();
        let driver = add_driver(&state, DriverStatus::Available);
        let order = add_order(&state, OrderStatus::PendingAssignment);

        let err = assign_driver(&state, &Actor::Driver(driver), order, driver).unwrap_err();

        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn release_ignores_other_orders() {
        let state = state();
        let admin = Actor::Admin(Uuid::new_v4());
        let driver = add_driver(&state, DriverStatus::Available);
        let order = add_order(&state, OrderStatus::PendingAssignment);
        assign_driver(&state, &admin, order, driver).unwrap();

        release_driver(&state, driver, Uuid::new_v4());
        assert_eq!(state.drivers.get(&driver).unwrap().status, DriverStatus::Busy);

        release_driver(&state, driver, order);
        assert_eq!(state.drivers.get(&driver).unwrap().status, DriverStatus::Available);
    }

    #[test]
    fn self_reported_busy_without_order_is_flagged() {
        let state = state();
        let driver = add_driver(&state, DriverStatus::Busy);

        let violations = driver_consistency_violations(&state);

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].driver_id, driver);
        assert!(violations[0].holding_orders.is_empty());
    }
}
