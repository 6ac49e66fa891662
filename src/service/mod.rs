//! Service layer
//!
//! Contains business logic separated from HTTP handlers.

mod session;

pub use session::SessionService;
