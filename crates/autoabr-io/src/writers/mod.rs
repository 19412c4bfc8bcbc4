//! Result exporters.

pub mod csv;

pub use self::csv::ResultCsvWriter;
