//! Schema introspection for the registered table

use duckdb::{Connection, Result as DuckResult};
use serde::Serialize;

use crate::dataset::quote_ident;

#[derive(Debug, Clone, Serialize)]
pub struct TableCatalog {
    pub table: String,
    pub row_count: u64,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
}

impl TableCatalog {
    /// Read column metadata and row count for `table` from `information_schema`
    pub fn from_connection(conn: &Connection, table: &str) -> DuckResult<Self> {
        let mut stmt = conn.prepare(
            "SELECT column_name, data_type, is_nullable \
             FROM information_schema.columns \
             WHERE table_name = ? \
             ORDER BY ordinal_position",
        )?;
        let columns = stmt
            .query_map([table], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    is_nullable: row.get::<_, String>(2)? == "YES",
                })
            })?
            .collect::<DuckResult<Vec<_>>>()?;

        let count_query = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let row_count: i64 = conn.query_row(&count_query, [], |row| row.get(0))?;

        Ok(TableCatalog {
            table: table.to_string(),
            row_count: row_count.max(0) as u64,
            columns,
        })
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}
