//! API layer
//!
//! HTTP handlers for:
//! - Home page
//! - Metrics (Prometheus)
//!
//! Sign-in routes live in `auth`.

mod home;
pub mod metrics;

pub use home::home_router;
pub use metrics::{metrics_router, track_requests};
