//! HTTP routes.

mod counter;
mod health;

pub use counter::{counter_handler, delete_session_handler, session_routes};
pub use health::{HealthResponse, health, health_routes};
