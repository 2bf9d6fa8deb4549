//! Target schema providers.
//!
//! A provider creates the target tables before any data moves. Two flavours
//! exist and the orchestrator uses whichever is configured without reconciling
//! them:
//!
//! - [`ScriptSchema`]: an authoritative DDL script, applied strictly
//! - [`DerivedSchema`]: `CREATE TABLE IF NOT EXISTS` derived from the source's
//!   own table definitions, applied tolerantly

mod derived;
mod script;

pub use derived::DerivedSchema;
pub use script::{split_statements, ScriptSchema};

use async_trait::async_trait;

use crate::config::SchemaSource;
use crate::core::{RowSource, TargetEngine, TargetLoader};
use crate::error::Result;
use crate::spec::MigrationSpec;

/// Produces and applies target DDL.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Canonical table list shipped with the schema, if any.
    fn canonical_tables(&self) -> Option<&[String]> {
        None
    }

    /// Create the target tables for `tables` (already resolved and ordered).
    async fn apply(
        &self,
        source: &dyn RowSource,
        target: &dyn TargetLoader,
        tables: &[String],
        spec: &MigrationSpec,
    ) -> Result<()>;
}

/// Build the provider configured by `schema`, or `None` when DDL is skipped.
pub fn provider_for(
    schema: &SchemaSource,
    engine: TargetEngine,
) -> Result<Option<Box<dyn SchemaProvider>>> {
    Ok(match schema {
        SchemaSource::Derived => Some(Box::new(DerivedSchema::new(engine))),
        SchemaSource::Script { path, tables } => {
            Some(Box::new(ScriptSchema::load(path, tables.clone())?))
        }
        SchemaSource::None => None,
    })
}
