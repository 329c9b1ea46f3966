//! DuckDB binding for the employee dataset
//!
//! Loads a dataset file once into a named table and answers ad-hoc SQL
//! against it, returning ordered [`Record`]s. After loading, the database is
//! only ever reopened read-only, so no statement can change the table.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use duckdb::{AccessMode, Config, Connection};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info};

pub mod catalog;
pub mod dataset;
pub mod value;

pub use catalog::{ColumnInfo, TableCatalog};
pub use dataset::DatasetFormat;
pub use value::{Interval, Record, Scalar};

use dataset::{quote_ident, quote_literal};

/// Name the dataset is registered under unless configured otherwise
pub const DEFAULT_TABLE: &str = "data";

const SCRATCH_DATABASE: &str = "dataset.duckdb";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Database(#[from] duckdb::Error),

    #[error("Dataset file not found: {}", .0.display())]
    DatasetNotFound(PathBuf),

    #[error("Unsupported dataset format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to load extension {name}: {message}")]
    Extension { name: String, message: String },

    #[error("Scratch database: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine connection lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
    pub row_count: usize,
}

impl QueryResult {
    pub fn into_records(self) -> Vec<Record> {
        self.rows
    }
}

/// Where the dataset is materialized and the name it is queried under
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Database file to write the table into; a scratch file when unset
    pub database: Option<PathBuf>,
    pub table: String,
    /// Local build of the `read_stat` extension
    pub extension_path: Option<PathBuf>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            database: None,
            table: DEFAULT_TABLE.to_string(),
            extension_path: None,
        }
    }
}

/// Shared read-only handle on the database holding the dataset table
///
/// `duckdb::Connection` is not `Sync`, so the root connection sits behind a
/// mutex that is held only long enough to clone a per-query handle onto the
/// same database.
pub struct DuckEngine {
    conn: Mutex<Connection>,
    table: String,
    // Declared after `conn` so the database is closed before the directory goes
    _scratch: Option<TempDir>,
}

impl DuckEngine {
    /// Materialize the dataset at `path` and open it for querying
    ///
    /// Statistical formats need the `read_stat` extension; it is loaded from
    /// `options.extension_path` when set, otherwise installed from the
    /// community repository.
    pub fn load(path: &Path, options: &EngineOptions) -> Result<Self, EngineError> {
        if !path.exists() {
            return Err(EngineError::DatasetNotFound(path.to_path_buf()));
        }
        let format = DatasetFormat::from_path(path)?;
        let started = Instant::now();

        let create = format!(
            "CREATE OR REPLACE TABLE {} AS SELECT * FROM {}",
            quote_ident(&options.table),
            format.reader(path)
        );
        let engine = Self::materialize(options, |conn| {
            if let Some(extension) = format.required_extension() {
                load_extension(conn, extension, options.extension_path.as_deref())?;
            }
            conn.execute_batch(&create)?;
            Ok(())
        })?;

        let rows = engine.row_count()?;
        info!(
            dataset = %path.display(),
            table = %engine.table,
            format = ?format,
            rows,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Dataset loaded"
        );
        Ok(engine)
    }

    /// Run `setup` against a fresh database, then open it for querying
    pub fn from_batch(setup: &str, options: &EngineOptions) -> Result<Self, EngineError> {
        Self::materialize(options, |conn| Ok(conn.execute_batch(setup)?))
    }

    /// Write through a read-write connection, close it, and reopen read-only
    fn materialize<F>(options: &EngineOptions, populate: F) -> Result<Self, EngineError>
    where
        F: FnOnce(&Connection) -> Result<(), EngineError>,
    {
        let (scratch, database) = match &options.database {
            Some(path) => (None, path.clone()),
            None => {
                let dir = tempfile::Builder::new().prefix("staffql-").tempdir()?;
                let database = dir.path().join(SCRATCH_DATABASE);
                (Some(dir), database)
            }
        };

        {
            let writer = Connection::open(&database)?;
            populate(&writer)?;
            writer.execute_batch("CHECKPOINT")?;
        }

        let config = Config::default().access_mode(AccessMode::ReadOnly)?;
        let conn = Connection::open_with_flags(&database, config)?;
        debug!(database = %database.display(), "Opened dataset database read-only");

        Ok(Self {
            conn: Mutex::new(conn),
            table: options.table.clone(),
            _scratch: scratch,
        })
    }

    /// Name the dataset is queryable under
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Run `sql` and collect every row
    ///
    /// The statement is executed as given; callers are responsible for
    /// screening it first. Anything that writes fails against the read-only
    /// database.
    pub fn execute(&self, sql: &str) -> Result<QueryResult, EngineError> {
        let conn = self.handle()?;
        let started = Instant::now();

        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let columns: Vec<String> = rows
            .as_ref()
            .map(|stmt| stmt.column_names())
            .unwrap_or_default();

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (idx, column) in columns.iter().enumerate() {
                record.push(column.clone(), Scalar::from_row(row, idx)?);
            }
            records.push(record);
        }

        debug!(
            rows = records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query executed"
        );
        Ok(QueryResult {
            columns,
            row_count: records.len(),
            rows: records,
        })
    }

    /// Columns and row count of the dataset table
    pub fn catalog(&self) -> Result<TableCatalog, EngineError> {
        let conn = self.handle()?;
        Ok(TableCatalog::from_connection(&conn, &self.table)?)
    }

    fn row_count(&self) -> Result<i64, EngineError> {
        let conn = self.handle()?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&self.table));
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, EngineError> {
        self.conn.lock().map_err(|_| EngineError::Poisoned)
    }

    fn handle(&self) -> Result<Connection, EngineError> {
        Ok(self.lock()?.try_clone()?)
    }
}

/// Load a DuckDB extension from a local file, or install it from the community repository
fn load_extension(conn: &Connection, name: &str, local_path: Option<&Path>) -> Result<(), EngineError> {
    let extension_error = |message: String| EngineError::Extension {
        name: name.to_string(),
        message,
    };

    if let Some(path) = local_path {
        if !path.exists() {
            return Err(extension_error(format!("not found at {}", path.display())));
        }
        conn.execute_batch(&format!("LOAD {}", quote_literal(&path.to_string_lossy())))
            .map_err(|e| extension_error(e.to_string()))?;
        info!("Loaded {} extension from: {}", name, path.display());
    } else {
        conn.execute_batch(&format!("INSTALL {name} FROM community; LOAD {name};"))
            .map_err(|e| extension_error(e.to_string()))?;
        info!("Loaded {} extension from community repository", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_rows() -> DuckEngine {
        DuckEngine::from_batch(
            "CREATE TABLE data (id INTEGER, sexe VARCHAR, salact DOUBLE, datenais DATE);
             INSERT INTO data VALUES
                (1, 'm', 57000.0, DATE '1952-02-03'),
                (2, 'f', 21450.0, DATE '1929-07-26'),
                (3, 'f', NULL, NULL);",
            &EngineOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_execute_returns_typed_records() -> Result<(), EngineError> {
        let engine = engine_with_rows();
        let result = engine.execute("SELECT id, sexe, salact, datenais FROM data ORDER BY id")?;

        assert_eq!(result.columns, vec!["id", "sexe", "salact", "datenais"]);
        assert_eq!(result.row_count, 3);

        let first = &result.rows[0];
        assert_eq!(first.get("id"), Some(&Scalar::Integer(1)));
        assert_eq!(first.get("sexe"), Some(&Scalar::Text("m".to_string())));
        assert_eq!(first.get("salact"), Some(&Scalar::Float(57000.0)));
        assert_eq!(
            first.get("datenais"),
            Some(&Scalar::Date(chrono::NaiveDate::from_ymd_opt(1952, 2, 3).unwrap()))
        );

        let last = &result.rows[2];
        assert!(last.get("salact").unwrap().is_null());
        assert!(last.get("datenais").unwrap().is_null());
        Ok(())
    }

    #[test]
    fn test_empty_result_keeps_columns() -> Result<(), EngineError> {
        let engine = engine_with_rows();
        let result = engine.execute("SELECT id, sexe FROM data WHERE id > 100")?;
        assert_eq!(result.row_count, 0);
        assert_eq!(result.columns, vec!["id", "sexe"]);
        Ok(())
    }

    #[test]
    fn test_aggregate_and_count() -> Result<(), EngineError> {
        let engine = engine_with_rows();
        let count = engine.execute("SELECT COUNT(*) AS n FROM data")?;
        assert_eq!(count.rows[0].get("n").and_then(Scalar::as_i64), Some(3));

        let avg = engine.execute("SELECT AVG(salact) AS avg FROM data WHERE sexe = 'm'")?;
        assert_eq!(avg.rows[0].get("avg").and_then(Scalar::as_f64), Some(57000.0));
        Ok(())
    }

    #[test]
    fn test_bad_sql_surfaces_database_error() {
        let engine = engine_with_rows();
        let err = engine.execute("SELECT no_such_column FROM data").unwrap_err();
        assert!(matches!(err, EngineError::Database(_)));
        assert!(err.to_string().contains("no_such_column"));
    }

    #[test]
    fn test_missing_dataset_file() {
        let err = DuckEngine::load(Path::new("/nonexistent/Employee.sav"), &EngineOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::DatasetNotFound(_)));
    }

    #[test]
    fn test_missing_local_extension() {
        let conn = Connection::open_in_memory().unwrap();
        let err = load_extension(&conn, "read_stat", Some(Path::new("/nonexistent/read_stat.duckdb_extension")))
            .unwrap_err();
        assert!(matches!(err, EngineError::Extension { .. }));
    }

    #[test]
    fn test_table_is_read_only() -> Result<(), EngineError> {
        let engine = engine_with_rows();
        for sql in [
            "TRUNCATE data",
            "CREATE OR REPLACE TABLE data AS SELECT 42 AS n",
            "UPDATE data SET salact = 0",
        ] {
            let err = engine.execute(sql).unwrap_err();
            assert!(matches!(err, EngineError::Database(_)), "{}", sql);
        }
        let count = engine.execute("SELECT COUNT(*) AS n FROM data")?;
        assert_eq!(count.rows[0].get("n").and_then(Scalar::as_i64), Some(3));
        Ok(())
    }

    #[test]
    fn test_scratch_database_removed_on_drop() {
        let engine = engine_with_rows();
        let dir = engine._scratch.as_ref().unwrap().path().to_path_buf();
        assert!(dir.join(SCRATCH_DATABASE).exists());

        drop(engine);
        assert!(!dir.exists());
    }

    #[test]
    fn test_duplicate_column_names_keep_last_value() -> Result<(), EngineError> {
        let engine = engine_with_rows();
        let result = engine.execute("SELECT 1 AS a, 2 AS a")?;
        let record = &result.rows[0];
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("a"), Some(&Scalar::Integer(2)));
        Ok(())
    }

    #[test]
    fn test_catalog_lists_columns() -> Result<(), EngineError> {
        let engine = engine_with_rows();
        let catalog = engine.catalog()?;
        assert_eq!(catalog.table, "data");
        assert_eq!(catalog.row_count, 3);
        assert_eq!(catalog.columns.len(), 4);
        assert_eq!(catalog.column("salact").unwrap().data_type, "DOUBLE");
        Ok(())
    }
}
