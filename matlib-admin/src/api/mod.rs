//! HTTP API handlers for matlib-admin

pub mod ajax;
pub mod error;
pub mod health;
pub mod materials;
pub mod tags;

pub use error::ApiError;
pub use health::health_routes;
