//! Database driver implementations.
//!
//! - [`sqlite`]: the read-only source
//! - [`postgres`]: PostgreSQL target
//! - [`mysql`]: MySQL/MariaDB target
//! - [`common`]: shared utilities (TLS)
//!
//! Each target driver provides a `Dialect` (SQL syntax strategy) and a
//! `TargetLoader`. Dialects are dispatched through the [`DialectImpl`] enum
//! rather than a trait object.

pub mod common;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use common::{SslMode, TlsBuilder};
pub use mysql::{MysqlDialect, MysqlLoader};
pub use postgres::{PostgresDialect, PostgresLoader};
pub use sqlite::SqliteSource;

use crate::config::TargetLocator;
use crate::core::{Dialect, TargetEngine, TargetLoader};
use crate::error::Result;

/// Enum-based static dispatch for dialects.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Postgres(PostgresDialect),
    Mysql(MysqlDialect),
}

impl DialectImpl {
    /// The dialect of a target engine family.
    pub fn for_engine(engine: TargetEngine) -> Self {
        match engine {
            TargetEngine::Postgres => DialectImpl::Postgres(PostgresDialect::new()),
            TargetEngine::Mysql => DialectImpl::Mysql(MysqlDialect::new()),
        }
    }
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        match self {
            DialectImpl::Postgres(d) => d.name(),
            DialectImpl::Mysql(d) => d.name(),
        }
    }

    fn quote_ident(&self, name: &str) -> String {
        match self {
            DialectImpl::Postgres(d) => d.quote_ident(name),
            DialectImpl::Mysql(d) => d.quote_ident(name),
        }
    }

    fn param_placeholder(&self, index: usize) -> String {
        match self {
            DialectImpl::Postgres(d) => d.param_placeholder(index),
            DialectImpl::Mysql(d) => d.param_placeholder(index),
        }
    }

    fn build_insert_ignore(&self, table: &str, columns: &[String]) -> String {
        match self {
            DialectImpl::Postgres(d) => d.build_insert_ignore(table, columns),
            DialectImpl::Mysql(d) => d.build_insert_ignore(table, columns),
        }
    }

    fn map_source_type(&self, declared_type: &str, is_primary_key: bool) -> String {
        match self {
            DialectImpl::Postgres(d) => d.map_source_type(declared_type, is_primary_key),
            DialectImpl::Mysql(d) => d.map_source_type(declared_type, is_primary_key),
        }
    }

    fn identity_column(&self, name: &str) -> String {
        match self {
            DialectImpl::Postgres(d) => d.identity_column(name),
            DialectImpl::Mysql(d) => d.identity_column(name),
        }
    }

    fn create_table_suffix(&self) -> &str {
        match self {
            DialectImpl::Postgres(d) => d.create_table_suffix(),
            DialectImpl::Mysql(d) => d.create_table_suffix(),
        }
    }
}

/// Open the loader for the engine family named by the locator's scheme.
pub async fn connect_target(locator: &TargetLocator) -> Result<Box<dyn TargetLoader>> {
    Ok(match locator.engine() {
        TargetEngine::Postgres => Box::new(PostgresLoader::connect(locator).await?),
        TargetEngine::Mysql => Box::new(MysqlLoader::connect(locator).await?),
    })
}
