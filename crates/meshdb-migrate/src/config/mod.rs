//! Run configuration: locators, schema source and the migration spec.

mod locator;
mod validation;

pub use locator::{redact, SourceLocator, TargetLocator};

use std::path::PathBuf;

use crate::error::Result;
use crate::spec::MigrationSpec;

/// Where the target DDL comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SchemaSource {
    /// Derive `CREATE TABLE IF NOT EXISTS` from the source's own tables.
    /// Per-statement failures are tolerated.
    #[default]
    Derived,
    /// Apply a DDL script verbatim. Any failing statement aborts the run.
    Script {
        path: PathBuf,
        /// Canonical table list accompanying the script; may be empty.
        tables: Vec<String>,
    },
    /// Assume the target schema already exists.
    None,
}

/// Rows per batch streamed from the source.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Everything one run needs.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub source: SourceLocator,
    pub target: TargetLocator,
    /// Read, count and transform, but write nothing.
    pub dry_run: bool,
    pub verbose: bool,
    /// Rows per batch streamed from the source into the loader.
    pub batch_size: usize,
    pub schema: SchemaSource,
    pub spec: MigrationSpec,
}

impl MigrationOptions {
    /// Parse both locators; everything else takes its default
    /// (builtin MeshMonitor spec, derived schema, writes enabled).
    pub fn new(source: &str, target: &str) -> Result<Self> {
        Ok(Self {
            source: source.parse()?,
            target: target.parse()?,
            dry_run: false,
            verbose: false,
            batch_size: DEFAULT_BATCH_SIZE,
            schema: SchemaSource::default(),
            spec: MigrationSpec::meshmonitor(),
        })
    }

    /// Validate the options before any connection is opened.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}
