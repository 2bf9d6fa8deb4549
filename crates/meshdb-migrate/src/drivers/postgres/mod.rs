//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PostgresLoader`]: target loader over deadpool-postgres

mod catalog;
mod dialect;
mod loader;
mod params;

pub use dialect::PostgresDialect;
pub use loader::PostgresLoader;
pub use params::{to_param, PgParam};
