//! SQLite data source backed by `rusqlite`.

use crate::source::{DataSource, RawRows, SqlDialect, SqlValue};
use crate::types::{Result, RetrieverError};
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Every user table and view with its columns, in declaration order.
const COLUMNS_SQL: &str = "
    SELECT m.name, p.name
    FROM sqlite_master AS m
    JOIN pragma_table_info(m.name) AS p
    WHERE m.type IN ('table', 'view')
      AND m.name NOT LIKE 'sqlite_%'
    ORDER BY m.name, p.cid";

/// SQLite connection held for the whole session.
///
/// Access is serialized through a mutex; the retriever never issues two
/// statements concurrently anyway.
pub struct SqliteSource {
    conn: Mutex<Connection>,
}

impl SqliteSource {
    /// Open (or create) a database file.
    ///
    /// # Errors
    ///
    /// Returns `RetrieverError::Source` if the file cannot be opened
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            RetrieverError::Source(format!("cannot open {}: {}", path.as_ref().display(), e))
        })?;
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RetrieverError::Source(format!("cannot open in-memory database: {}", e)))?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run a batch of semicolon-separated statements (schema setup, seeding).
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock()?.execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RetrieverError::Source("SQLite connection lock poisoned".to_string()))
    }

    fn read_rows(conn: &Connection, sql: &str) -> Result<RawRows> {
        let mut stmt = conn.prepare(sql)?;

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let decimal: Vec<bool> = stmt
            .columns()
            .iter()
            .map(|c| c.decl_type().map(is_decimal_type).unwrap_or(false))
            .collect();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for (i, is_decimal) in decimal.iter().enumerate() {
                values.push(to_sql_value(row.get_ref(i)?, *is_decimal));
            }
            rows.push(values);
        }

        Ok(RawRows { columns, rows })
    }
}

/// Declared types SQLite stores with NUMERIC affinity but callers expect as fixed-point.
fn is_decimal_type(decl: &str) -> bool {
    let decl = decl.to_ascii_uppercase();
    decl.starts_with("DECIMAL") || decl.starts_with("NUMERIC") || decl.contains("MONEY")
}

fn to_sql_value(value: ValueRef<'_>, decimal: bool) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) if decimal => SqlValue::Decimal(i.to_string()),
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(f) if decimal => SqlValue::Decimal(f.to_string()),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    }
}

#[async_trait]
impl DataSource for SqliteSource {
    async fn columns(&self) -> Result<Vec<(String, String)>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(COLUMNS_SQL)
            .map_err(|e| RetrieverError::CatalogUnavailable(e.to_string()))?;

        let pairs = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| RetrieverError::CatalogUnavailable(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RetrieverError::CatalogUnavailable(e.to_string()))?;

        Ok(pairs)
    }

    async fn query(&self, sql: &str) -> Result<RawRows> {
        let conn = self.lock()?;
        Self::read_rows(&conn, sql)
    }

    fn system(&self) -> &'static str {
        "sqlite"
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }
}
