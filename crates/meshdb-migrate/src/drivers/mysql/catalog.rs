//! MySQL catalog introspection.

use mysql_async::prelude::*;
use mysql_async::Conn;

use crate::core::{ColumnCatalog, ColumnType};
use crate::error::Result;

const COLUMNS_QUERY: &str = r#"
    SELECT CAST(COLUMN_NAME AS CHAR(255)),
           CAST(DATA_TYPE AS CHAR(64)),
           CAST(COLUMN_TYPE AS CHAR(255))
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

/// Load the column catalog of a table in the connection's current database.
///
/// A table that does not exist yields an empty catalog.
pub(crate) async fn load_columns(conn: &mut Conn, table: &str) -> Result<ColumnCatalog> {
    let rows: Vec<(String, String, String)> = conn.exec(COLUMNS_QUERY, (table,)).await?;

    let mut catalog = ColumnCatalog::new(table);
    for (name, data_type, column_type) in rows {
        let category = ColumnType::from_mysql(&data_type, &column_type);
        catalog.add(name, column_type, category);
    }
    Ok(catalog)
}

/// Whether `table.column` is an AUTO_INCREMENT column.
pub(crate) async fn is_auto_increment(conn: &mut Conn, table: &str, column: &str) -> Result<bool> {
    let found: Option<String> = conn
        .exec_first(
            "SELECT CAST(COLUMN_NAME AS CHAR(255)) FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ? \
             AND EXTRA LIKE '%auto_increment%'",
            (table, column),
        )
        .await?;
    Ok(found.is_some())
}
