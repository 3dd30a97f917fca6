pub mod customer;
pub mod driver;
pub mod notification;
pub mod order;
pub mod payment;
