//! HTTP API handlers for dogpost-publisher
//!
//! Trigger endpoints feed events into the pipeline; the rest expose the
//! status surface, folder sweeps and health.

pub mod health;
pub mod status;
pub mod sweep;
pub mod triggers;

pub use health::health_routes;
pub use status::status_routes;
pub use sweep::sweep_routes;
pub use triggers::trigger_routes;
