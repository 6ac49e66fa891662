//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("sessiongate_http_requests_total", "Total number of HTTP requests"),
        &["method", "status"]
    ).expect("metric can be created");

    // Sign-in Metrics
    pub static ref SIGN_INS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("sessiongate_sign_ins_total", "Total number of sign-in callbacks"),
        &["provider", "outcome"]
    ).expect("metric can be created");
    pub static ref USERS_CREATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("sessiongate_users_created_total", "Total number of users created on first sign-in"),
        &["provider"]
    ).expect("metric can be created");
    pub static ref SIGN_OUTS_TOTAL: IntCounter = IntCounter::new(
        "sessiongate_sign_outs_total",
        "Total number of sign-outs"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("sessiongate_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
            .expect("HTTP_REQUESTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(SIGN_INS_TOTAL.clone()))
            .expect("SIGN_INS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(USERS_CREATED_TOTAL.clone()))
            .expect("USERS_CREATED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(SIGN_OUTS_TOTAL.clone()))
            .expect("SIGN_OUTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}

/// Record the outcome of a sign-in callback.
pub fn record_sign_in(provider: &str, outcome: &str) {
    SIGN_INS_TOTAL.with_label_values(&[provider, outcome]).inc();
}

/// Record an HTTP response.
pub fn record_http_request(method: &str, status: u16) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, &status.to_string()])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_metrics();
        init_metrics();
        record_sign_in("facebook", "success");
        let families = REGISTRY.gather();
        assert!(
            families
                .iter()
                .any(|family| family.get_name() == "sessiongate_sign_ins_total")
        );
    }
}
