//! Error handling for flux quality-control operations.
//!
//! Provides error types with context for loading, timestamp regularization,
//! configuration and filter-stage failures.

use chrono::NaiveDateTime;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FluxQcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Configuration file could not be parsed: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Input file not found at path: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Required column '{column}' is missing")]
    MissingColumn { column: String },

    #[error("Non-numeric value '{value}' in column '{column}' at row {row}")]
    NonNumericValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Table has no rows with a valid timestamp")]
    EmptyTable,

    #[error("At least two distinct timestamps are needed to detect the sampling frequency, found {count}")]
    TooFewTimestamps { count: usize },

    #[error("Export column '{column}' would be written twice; rename the input column")]
    DuplicateColumn { column: String },

    #[error(
        "Sampling frequency could not be detected: no {window} consecutive equal intervals within the first {horizon} windows"
    )]
    FrequencyUndetected { window: usize, horizon: usize },

    #[error("{count} timestamps do not fall on the {frequency_minutes}-minute grid (first: {first})")]
    IrregularTimestamps {
        count: usize,
        frequency_minutes: i64,
        first: NaiveDateTime,
    },

    #[error("Timeline is not uniform at row {row}: {reason}")]
    NonUniformTimeline { row: usize, reason: String },

    #[error("Column '{name}' has {found} values, table has {expected} rows")]
    LengthMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Date range for '{variable}' starts after it stops: {start} > {stop}")]
    InvalidDateRange {
        variable: String,
        start: NaiveDateTime,
        stop: NaiveDateTime,
    },

    #[error("Invalid parameter for {stage} filter on '{variable}': {message}")]
    InvalidParameter {
        stage: String,
        variable: String,
        message: String,
    },
}

impl FluxQcError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error for one filter invocation
    pub fn invalid_parameter(
        stage: impl Into<String>,
        variable: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            stage: stage.into(),
            variable: variable.into(),
            message: message.into(),
        }
    }

    /// True when the error only invalidates a single filter invocation
    pub fn is_stage_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidDateRange { .. } | Self::InvalidParameter { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FluxQcError>;
