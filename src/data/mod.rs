//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - User lookup-or-create keyed by `(provider, uid)`

mod database;
mod models;

pub use database::{Database, UserRepository};
pub use models::*;

#[cfg(test)]
pub use database::MockUserRepository;
