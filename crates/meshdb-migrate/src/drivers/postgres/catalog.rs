//! PostgreSQL catalog introspection.

use tokio_postgres::Client;

use crate::core::{ColumnCatalog, ColumnType};
use crate::error::Result;

const COLUMNS_QUERY: &str = r#"
    SELECT column_name::text, data_type::text, udt_name::text
    FROM information_schema.columns
    WHERE table_schema = current_schema() AND table_name = $1
    ORDER BY ordinal_position
"#;

/// Load the column catalog of a table in the connection's current schema.
///
/// A table that does not exist yields an empty catalog.
pub(crate) async fn load_columns(client: &Client, table: &str) -> Result<ColumnCatalog> {
    let rows = client.query(COLUMNS_QUERY, &[&table]).await?;

    let mut catalog = ColumnCatalog::new(table);
    for row in rows {
        let name: String = row.get(0);
        let data_type: String = row.get(1);
        let udt_name: String = row.get(2);
        let category = match ColumnType::from_postgres(&udt_name) {
            ColumnType::Other => ColumnType::from_postgres(&data_type),
            category => category,
        };
        catalog.add(name, udt_name, category);
    }
    Ok(catalog)
}
