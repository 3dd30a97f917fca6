pub mod access;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateways;
pub mod geo;
pub mod models;
pub mod observability;
pub mod state;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
