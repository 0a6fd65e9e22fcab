//! Schema catalog: table → column snapshot of the connected data source.

use crate::source::DataSource;
use crate::types::{Result, RetrieverError};
use std::collections::BTreeMap;

/// Immutable table → columns snapshot, taken once per connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaCatalog {
    tables: BTreeMap<String, Vec<String>>,
}

impl SchemaCatalog {
    /// Load the catalog from a data source.
    ///
    /// # Arguments
    ///
    /// * `source` - Connected data source
    /// * `essential` - Table names that are always exposed, even if the
    ///   metadata query does not report them
    ///
    /// # Errors
    ///
    /// Returns `RetrieverError::CatalogUnavailable` if introspection fails
    pub async fn load(source: &dyn DataSource, essential: &[String]) -> Result<Self> {
        let pairs = source.columns().await.map_err(|e| match e {
            RetrieverError::CatalogUnavailable(msg) => RetrieverError::CatalogUnavailable(msg),
            other => RetrieverError::CatalogUnavailable(other.to_string()),
        })?;

        let catalog = Self::from_pairs(essential, pairs);
        tracing::info!(
            tables = catalog.len(),
            essential = essential.len(),
            "Schema catalog loaded"
        );
        Ok(catalog)
    }

    /// Build a catalog from `(table, column)` pairs plus the essential table list.
    pub fn from_pairs<I>(essential: &[String], pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut tables: BTreeMap<String, Vec<String>> = essential
            .iter()
            .map(|name| (name.clone(), Vec::new()))
            .collect();

        for (table, column) in pairs {
            let columns = tables.entry(table).or_default();
            if !columns.contains(&column) {
                columns.push(column);
            }
        }

        Self { tables }
    }

    /// Whether `table` is a catalog key.
    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Columns of `table`, if it exists.
    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    /// All table names, sorted.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Iterate over `(table, columns)` entries, sorted by table name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.tables.iter().map(|(t, c)| (t.as_str(), c.as_slice()))
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the catalog has no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
