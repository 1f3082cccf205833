use std::io;

use thiserror::Error;

use super::model::Column;

/// Failure to produce a [`PricingTable`](super::model::PricingTable) from a source file.
///
/// Every variant is fatal at startup; per-field parse problems never surface
/// here, they degrade the affected cell to absent instead.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("workbook read error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("sheet not found: {0}")]
    SheetNotFound(String),

    #[error("CSV read error: {0}")]
    Csv(#[from] csv::Error),

    #[error("parquet read error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("JSON read error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("unsupported file extension: .{0}")]
    UnsupportedExtension(String),

    #[error("invalid file format: {0}")]
    InvalidFormat(String),
}

/// A filter or projection that names something the record schema doesn't have.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("column {0} is not categorical and cannot be filtered")]
    NotCategorical(Column),

    #[error("malformed filter '{0}', expected column=value")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
