//! Export of a filtered table to Parquet or CSV.
//!
//! The exported frame holds the timestamp, every measurement column, one 0/1
//! column per registered filter instance and, optionally, the combined mask
//! and the masked values of each filtered variable.

use crate::config::{OutputConfig, OutputFormat};
use crate::constants::{FILTERED_SUFFIX, VALID_SUFFIX, columns};
use crate::error::{FluxQcError, Result};
use crate::models::FluxTable;
use crate::registry::FilterRegistry;

use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Writes filtered tables in the configured format
#[derive(Debug, Clone)]
pub struct TableWriter {
    output_path: PathBuf,
    config: OutputConfig,
}

impl TableWriter {
    pub fn new(output_path: PathBuf, config: OutputConfig) -> Self {
        Self {
            output_path,
            config,
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Build the export frame
    pub fn build_frame(&self, table: &FluxTable, registry: &FilterRegistry) -> Result<DataFrame> {
        let millis: Vec<i64> = table
            .timestamps()
            .iter()
            .map(|t| t.and_utc().timestamp_millis())
            .collect();
        let timestamp = Column::new(columns::TIMESTAMP.into(), millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;

        let mut frame_columns = vec![timestamp];
        for measurement in table.measurements() {
            frame_columns.push(Column::new(
                measurement.name.as_str().into(),
                measurement.values.clone(),
            ));
        }

        for variable in registry.variables() {
            for id in registry.filters_for(variable) {
                if let Some(flag) = table.flag(id) {
                    frame_columns.push(flag_column(&id.column_name(), flag));
                }
            }
        }

        if self.config.include_combined || self.config.include_masked {
            for variable in registry.variables() {
                let mask = registry.combined_mask(table, variable);
                if self.config.include_combined {
                    frame_columns.push(flag_column(&format!("{variable}{VALID_SUFFIX}"), &mask));
                }
                if self.config.include_masked
                    && let Some(values) = table.column(variable)
                {
                    let masked: Vec<Option<f64>> = values
                        .iter()
                        .zip(&mask)
                        .map(|(value, pass)| value.filter(|_| *pass))
                        .collect();
                    frame_columns.push(Column::new(
                        format!("{variable}{FILTERED_SUFFIX}").into(),
                        masked,
                    ));
                }
            }
        }

        let mut seen = HashSet::with_capacity(frame_columns.len());
        if let Some(duplicate) = frame_columns
            .iter()
            .map(|column| column.name().as_str())
            .find(|name| !seen.insert(*name))
        {
            return Err(FluxQcError::DuplicateColumn {
                column: duplicate.to_string(),
            });
        }

        debug!(
            "Export frame has {} columns and {} rows",
            frame_columns.len(),
            table.len()
        );
        Ok(DataFrame::new(frame_columns)?)
    }

    /// Write the table and return the number of rows written
    pub fn write(&self, table: &FluxTable, registry: &FilterRegistry) -> Result<usize> {
        let mut df = self.build_frame(table, registry)?;

        if let Some(parent) = self.output_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.output_path)?;

        match self.config.format {
            OutputFormat::Parquet => {
                ParquetWriter::new(file)
                    .with_compression(ParquetCompression::Snappy)
                    .finish(&mut df)?;
            }
            OutputFormat::Csv => {
                CsvWriter::new(file)
                    .include_header(true)
                    .finish(&mut df)?;
            }
        }

        info!(
            "Wrote {} rows and {} columns to {}",
            df.height(),
            df.width(),
            self.output_path.display()
        );
        Ok(df.height())
    }
}

/// 0/1 integer column from a boolean flag
fn flag_column(name: &str, flag: &[bool]) -> Column {
    let values: Vec<i32> = flag.iter().map(|pass| i32::from(*pass)).collect();
    Column::new(name.into(), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::models::{FilterId, FilterKind};
    use chrono::{NaiveDate, TimeDelta};
    use tempfile::TempDir;

    fn filtered_table() -> (FluxTable, FilterRegistry) {
        let start = NaiveDate::from_ymd_opt(2023, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut table = FluxTable::uniform(start, TimeDelta::minutes(30), 3).unwrap();
        table
            .with_column("h", vec![Some(1.0), Some(2.0), None])
            .unwrap();
        let mut registry = FilterRegistry::new();
        registry
            .register(
                &mut table,
                FilterId::new("h", FilterKind::QualityCode),
                vec![true, false, true],
                &mut RecordingSink::new(),
            )
            .unwrap();
        (table, registry)
    }

    #[test]
    fn test_frame_column_layout() {
        let (table, registry) = filtered_table();
        let config = OutputConfig {
            include_masked: true,
            ..OutputConfig::default()
        };
        let writer = TableWriter::new(PathBuf::from("unused.parquet"), config);
        let df = writer.build_frame(&table, &registry).unwrap();

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        assert_eq!(
            names,
            vec!["timestamp", "h", "h_qualityfilter", "h_valid", "h_filtered"]
        );
        let flags: Vec<Option<i32>> = df
            .column("h_qualityfilter")
            .unwrap()
            .i32()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(flags, vec![Some(1), Some(0), Some(1)]);
        let masked: Vec<Option<f64>> = df
            .column("h_filtered")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(masked, vec![Some(1.0), None, None]);
    }

    #[test]
    fn test_input_column_clashing_with_generated_name() {
        let (mut table, registry) = filtered_table();
        table
            .with_column("h_valid", vec![Some(1.0), Some(1.0), Some(0.0)])
            .unwrap();
        let writer = TableWriter::new(PathBuf::from("unused.parquet"), OutputConfig::default());

        match writer.build_frame(&table, &registry) {
            Err(FluxQcError::DuplicateColumn { column }) => assert_eq!(column, "h_valid"),
            other => panic!("expected duplicate column error, got {other:?}"),
        }
    }

    #[test]
    fn test_write_parquet_and_csv() {
        let (table, registry) = filtered_table();
        let dir = TempDir::new().unwrap();

        let parquet = TableWriter::new(dir.path().join("out/qc.parquet"), OutputConfig::default());
        assert_eq!(parquet.write(&table, &registry).unwrap(), 3);
        assert!(parquet.output_path().exists());

        let csv = TableWriter::new(
            dir.path().join("qc.csv"),
            OutputConfig {
                format: OutputFormat::Csv,
                ..OutputConfig::default()
            },
        );
        csv.write(&table, &registry).unwrap();
        let content = std::fs::read_to_string(csv.output_path()).unwrap();
        assert!(content.starts_with("timestamp,h,h_qualityfilter,h_valid"));
    }
}
