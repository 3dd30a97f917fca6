pub mod assignment;
pub mod lifecycle;
pub mod notify;
pub mod payments;
pub mod pricing;
pub mod reconcile;
