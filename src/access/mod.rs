//! Role-based authorization.
//!
//! Identity is established upstream; requests arrive carrying the actor's role
//! and profile id in `x-actor-role` / `x-actor-id`. Every operation decides
//! what an actor may do by matching on [`Actor`].

mod extract;

use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};

pub use extract::{ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Customer(Uuid),
    Driver(Uuid),
    Admin(Uuid),
}

impl Actor {
    pub fn role(&self) -> &'static str {
        match self {
            Actor::Customer(_) => "customer",
            Actor::Driver(_) => "driver",
            Actor::Admin(_) => "admin",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Actor::Customer(id) | Actor::Driver(id) | Actor::Admin(id) => *id,
        }
    }
}

pub fn require_customer(actor: &Actor, action: &str) -> Result<Uuid, AppError> {
    match actor {
        Actor::Customer(id) => Ok(*id),
        _ => Err(AppError::Forbidden(format!("only customers can {action}"))),
    }
}

pub fn require_driver(actor: &Actor, action: &str) -> Result<Uuid, AppError> {
    match actor {
        Actor::Driver(id) => Ok(*id),
        _ => Err(AppError::Forbidden(format!("only drivers can {action}"))),
    }
}

pub fn require_admin(actor: &Actor, action: &str) -> Result<Uuid, AppError> {
    match actor {
        Actor::Admin(id) => Ok(*id),
        _ => Err(AppError::Forbidden(format!("only admins can {action}"))),
    }
}

/// A driver acting on their own profile.
pub fn require_driver_self(actor: &Actor, driver_id: Uuid) -> Result<(), AppError> {
    match actor {
        Actor::Driver(id) if *id == driver_id => Ok(()),
        Actor::Driver(_) => Err(AppError::Forbidden("not authorized".to_string())),
        _ => Err(AppError::Forbidden(
            "only drivers can update their status".to_string(),
        )),
    }
}

/// The driver themself, or any admin.
pub fn require_driver_self_or_admin(actor: &Actor, driver_id: Uuid) -> Result<(), AppError> {
    match actor {
        Actor::Admin(_) => Ok(()),
        Actor::Driver(id) if *id == driver_id => Ok(()),
        _ => Err(AppError::Forbidden("not authorized".to_string())),
    }
}

/// The customer themself, or any admin.
pub fn require_customer_self_or_admin(actor: &Actor, customer_id: Uuid) -> Result<(), AppError> {
    match actor {
        Actor::Admin(_) => Ok(()),
        Actor::Customer(id) if *id == customer_id => Ok(()),
        _ => Err(AppError::Forbidden("not authorized".to_string())),
    }
}

pub fn can_view_order(actor: &Actor, order: &Order) -> bool {
    match actor {
        Actor::Admin(_) => true,
        Actor::Customer(id) => order.customer_id == *id,
        Actor::Driver(id) => order.driver_id == Some(*id),
    }
}

/// Gate for the generic status update. Customers never move orders; drivers
/// only move orders assigned to them, and only into the driver target set.
pub fn authorize_status_update(
    actor: &Actor,
    order: &Order,
    target: OrderStatus,
) -> Result<(), AppError> {
    match actor {
        Actor::Admin(_) => Ok(()),
        Actor::Driver(id) => {
            if order.driver_id != Some(*id) {
                return Err(AppError::Forbidden("not authorized".to_string()));
            }
            if !target.is_driver_target() {
                return Err(AppError::Forbidden(format!(
                    "drivers cannot set status {target}"
                )));
            }
            Ok(())
        }
        Actor::Customer(_) => Err(AppError::Forbidden(
            "only admins and drivers can update order status".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{authorize_status_update, can_view_order, require_driver_self, Actor};
    use crate::error::AppError;
    use crate::models::order::{ContactPoint, Order, OrderStatus};

    fn stop() -> ContactPoint {
        ContactPoint {
            name: "Wanjiku".to_string(),
            phone: "0712345678".to_string(),
            address: "Moi Avenue".to_string(),
            location: None,
        }
    }

    fn order(customer: Uuid, driver: Option<Uuid>, status: OrderStatus) -> Order {
        Order {
            id: Uuid::new_v4(),
            tracking_code: "PAKA0000TEST".to_string(),
            customer_id: customer,
            driver_id: driver,
            pickup: stop(),
            delivery: stop(),
            parcel_description: String::new(),
            parcel_weight: None,
            special_instructions: String::new(),
            is_within_area: true,
            price: Decimal::from(150),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            picked_up_at: None,
            delivered_at: None,
            tracking_logs: Vec::new(),
        }
    }

    #[test]
    fn assigned_driver_may_move_to_driver_targets_only() {
        let driver = Uuid::new_v4();
        let o = order(Uuid::new_v4(), Some(driver), OrderStatus::Assigned);
        let actor = Actor::Driver(driver);

        assert!(authorize_status_update(&actor, &o, OrderStatus::Accepted).is_ok());
        assert!(authorize_status_update(&actor, &o, OrderStatus::Delivered).is_ok());
        assert!(matches!(
            authorize_status_update(&actor, &o, OrderStatus::Cancelled),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            authorize_status_update(&actor, &o, OrderStatus::InTransit),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn other_driver_is_forbidden() {
        let o = order(Uuid::new_v4(), Some(Uuid::new_v4()), OrderStatus::Assigned);
        let intruder = Actor::Driver(Uuid::new_v4());

        assert!(matches!(
            authorize_status_update(&intruder, &o, OrderStatus::Accepted),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn customers_cannot_update_status_even_on_their_own_order() {
        let customer = Uuid::new_v4();
        let o = order(customer, None, OrderStatus::PendingPayment);

        assert!(authorize_status_update(&Actor::Customer(customer), &o, OrderStatus::Cancelled)
            .is_err());
    }

    #[test]
    fn admin_may_set_any_status() {
        let o = order(Uuid::new_v4(), None, OrderStatus::PendingAssignment);
        let admin = Actor::Admin(Uuid::new_v4());

        for status in OrderStatus::ALL {
            assert!(authorize_status_update(&admin, &o, status).is_ok());
        }
    }

    #[test]
    fn order_visibility_follows_ownership() {
        let customer = Uuid::new_v4();
        let driver = Uuid::new_v4();
        let o = order(customer, Some(driver), OrderStatus::Accepted);

        assert!(can_view_order(&Actor::Customer(customer), &o));
        assert!(can_view_order(&Actor::Driver(driver), &o));
        assert!(can_view_order(&Actor::Admin(Uuid::new_v4()), &o));
        assert!(!can_view_order(&Actor::Customer(Uuid::new_v4()), &o));
        assert!(!can_view_order(&Actor::Driver(Uuid::new_v4()), &o));
    }

    #[test]
    fn driver_status_is_self_service() {
        let driver = Uuid::new_v4();
        assert!(require_driver_self(&Actor::Driver(driver), driver).is_ok());
        assert!(require_driver_self(&Actor::Driver(Uuid::new_v4()), driver).is_err());
        assert!(require_driver_self(&Actor::Admin(driver), driver).is_err());
    }
}
