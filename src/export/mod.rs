//! Export of result tables to files.

pub mod csv;

pub use self::csv::CsvExporter;
