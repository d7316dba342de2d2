//! Flux QC Library
//!
//! Quality control for half-hourly eddy-covariance flux and meteorological
//! time series.
//!
//! This library provides tools for:
//! - Loading delimited text exports into per-variable numeric series
//! - Regularizing timestamps onto a complete, evenly spaced grid
//! - Flagging implausible samples through a fixed sequence of filter stages
//! - Tracking every filter per variable and combining them into one mask
//! - Writing flagged tables to Parquet or CSV

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod filters;
pub mod models;
pub mod processor;
pub mod registry;
pub mod rolling;
pub mod timeline;

// Re-export commonly used types
pub use config::{FilterConfig, QcConfig};
pub use error::{FluxQcError, Result};
pub use events::{EventSink, FilterEvent, RecordingSink, TracingSink};
pub use filters::{FilterStage, StageOutcome};
pub use models::{FilterId, FilterKind, FluxTable};
pub use processor::{FilterProcessor, QcOutcome, QcSummary};
pub use registry::FilterRegistry;
pub use timeline::{RawSeries, RegularizationReport, Regularizer};
