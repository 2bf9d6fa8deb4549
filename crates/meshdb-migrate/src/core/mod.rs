//! Core abstractions shared by the pipeline stages and the drivers.
//!
//! - [`value`]: scalar values and ordered rows
//! - [`schema`]: target engines, column categories, column catalogs
//! - [`traits`]: [`RowSource`], [`TargetLoader`] and [`Dialect`]

pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{CatalogColumn, ColumnCatalog, ColumnType, SourceColumn, TargetEngine};
pub use traits::{
    first_rows, Dialect, LoadReport, RowBatches, RowOutcome, RowSource, TargetLoader,
    READ_AHEAD_BATCHES,
};
pub use value::{SqlValue, TableRow};
