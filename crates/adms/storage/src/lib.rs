//! ADMS Storage Layer
//!
//! Diesel-based storage for devices, enrollments, punch logs, attendance
//! sessions and the device command queue.

mod error;
mod models;
mod schema;
mod sqlite;
mod traits;

pub use error::StoreError;
pub use models::*;
pub use sqlite::SqliteStorage;
pub use traits::*;

use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
