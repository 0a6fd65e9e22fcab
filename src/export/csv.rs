//! CSV export for spreadsheets.

use crate::types::table::cell_text;
use crate::types::{ResultTable, Result, RetrieverError};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// CSV exporter.
pub struct CsvExporter;

impl CsvExporter {
    /// Export one table to `<dir>/<label>.csv`.
    ///
    /// # Arguments
    ///
    /// * `table` - Table to export (header row, then every row)
    /// * `dir` - Output directory, created if missing
    ///
    /// # Returns
    ///
    /// Path of the written file
    ///
    /// # Errors
    ///
    /// Returns `RetrieverError::ExportError` if the file cannot be written
    pub fn export<P: AsRef<Path>>(table: &ResultTable, dir: P) -> Result<PathBuf> {
        Self::export_with_delimiter(table, dir, b',')
    }

    /// Export with custom delimiter.
    ///
    /// # Errors
    ///
    /// Returns `RetrieverError::ExportError` if the file cannot be written
    pub fn export_with_delimiter<P: AsRef<Path>>(table: &ResultTable, dir: P, delimiter: u8) -> Result<PathBuf> {
        Self::write(table, dir.as_ref(), &file_stem(&table.name), delimiter)
    }

    /// Export several tables into `dir`.
    ///
    /// Tables whose labels reduce to the same file name get a numeric suffix
    /// (`orders.csv`, `orders_2.csv`, ...), so no file of the batch is
    /// overwritten.
    ///
    /// # Errors
    ///
    /// Stops at the first table that cannot be written
    pub fn export_all<P: AsRef<Path>>(tables: &[ResultTable], dir: P) -> Result<Vec<PathBuf>> {
        let mut used = HashSet::new();
        tables
            .iter()
            .map(|table| {
                let stem = unique_stem(&file_stem(&table.name), &mut used);
                Self::write(table, dir.as_ref(), &stem, b',')
            })
            .collect()
    }

    fn write(table: &ResultTable, dir: &Path, stem: &str, delimiter: u8) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .map_err(|e| RetrieverError::ExportError(format!("cannot create {}: {}", dir.display(), e)))?;

        let path = dir.join(format!("{}.csv", stem));
        let mut writer = ::csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(&path)
            .map_err(|e| RetrieverError::ExportError(format!("cannot write {}: {}", path.display(), e)))?;

        writer.write_record(&table.columns)?;
        for row in &table.rows {
            writer.write_record(row.iter().map(cell_text))?;
        }
        writer.flush()?;

        tracing::info!(table = %table.name, rows = table.len(), path = %path.display(), "Table exported");
        Ok(path)
    }
}

/// Label reduced to characters that are safe in a file name.
fn file_stem(label: &str) -> String {
    let stem: String = label
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "table".to_string()
    } else {
        stem
    }
}

/// First of `base`, `base_2`, `base_3`, ... not in `used`; records the pick.
fn unique_stem(base: &str, used: &mut HashSet<String>) -> String {
    let mut stem = base.to_string();
    let mut n = 2;
    while used.contains(&stem) {
        stem = format!("{}_{}", base, n);
        n += 1;
    }
    used.insert(stem.clone());
    stem
}
