//! Delimited-text loading into a raw series.
//!
//! Every column is read as text so that numeric validation can name the
//! offending column, row and value instead of silently nulling it.

use crate::config::InputConfig;
use crate::error::{FluxQcError, Result};
use crate::models::Measurement;
use crate::timeline::RawSeries;

use chrono::NaiveDateTime;
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Load a delimited text file into a [`RawSeries`]
pub fn load_csv(path: &Path, config: &InputConfig) -> Result<RawSeries> {
    if !path.exists() {
        return Err(FluxQcError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    if !config.separator.is_ascii() {
        return Err(FluxQcError::configuration(format!(
            "input.separator must be a single ASCII character, got '{}'",
            config.separator
        )));
    }

    debug!("Reading {} as text columns", path.display());
    let separator = config.separator as u8;
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|opts| opts.with_separator(separator))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let series = series_from_frame(&df, config)?;
    info!(
        "Loaded {} rows and {} measurement columns from {}",
        series.len(),
        series.columns.len(),
        path.display()
    );
    Ok(series)
}

/// Convert an all-text frame into timestamps and numeric columns
pub fn series_from_frame(df: &DataFrame, config: &InputConfig) -> Result<RawSeries> {
    let time_column = config.time_column.as_str();
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    if !names.iter().any(|name| name == time_column) {
        return Err(FluxQcError::MissingColumn {
            column: time_column.to_string(),
        });
    }

    let timestamps = df
        .column(time_column)?
        .str()?
        .into_iter()
        .map(|cell| parse_timestamp(cell, &config.datetime_format))
        .collect();

    let mut series = RawSeries::new(timestamps);
    for name in names.iter().filter(|name| name.as_str() != time_column) {
        let cells = df.column(name)?.str()?;
        let values = parse_numeric(name, cells.into_iter(), &config.na_values)?;
        series.columns.push(Measurement {
            name: name.trim().to_string(),
            values,
        });
    }
    Ok(series)
}

fn parse_timestamp(cell: Option<&str>, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(cell?.trim(), format).ok()
}

/// Parse text cells as numbers; NA markers and empty cells become missing
pub fn parse_numeric<'a>(
    column: &str,
    cells: impl Iterator<Item = Option<&'a str>>,
    na_values: &[String],
) -> Result<Vec<Option<f64>>> {
    cells
        .enumerate()
        .map(|(row, cell)| {
            let Some(text) = cell.map(str::trim) else {
                return Ok(None);
            };
            if text.is_empty() || na_values.iter().any(|na| na == text) {
                return Ok(None);
            }
            match text.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(Some(value)),
                Ok(_) => Ok(None),
                Err(_) => Err(FluxQcError::NonNumericValue {
                    column: column.to_string(),
                    row,
                    value: text.to_string(),
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_numeric_handles_na_markers() {
        let na = vec!["NA".to_string(), "-9999".to_string()];
        let cells = vec![Some("1.5"), Some(" NA "), None, Some(""), Some("-9999"), Some("2e3")];
        let values = parse_numeric("h", cells.into_iter(), &na).unwrap();
        assert_eq!(values, vec![Some(1.5), None, None, None, None, Some(2000.0)]);
    }

    #[test]
    fn test_parse_numeric_rejects_text() {
        let cells = vec![Some("1.0"), Some("abc")];
        match parse_numeric("le", cells.into_iter(), &[]) {
            Err(FluxQcError::NonNumericValue { column, row, value }) => {
                assert_eq!(column, "le");
                assert_eq!(row, 1);
                assert_eq!(value, "abc");
            }
            other => panic!("Expected NonNumericValue, got {other:?}"),
        }
    }

    #[test]
    fn test_load_csv_reads_timestamps_and_columns() {
        let file = write_csv(
            "timestamp,h,qc_h\n\
             2023-06-01 00:00,10.5,0\n\
             2023-06-01 00:30,NA,1\n\
             not a date,12.0,2\n",
        );
        let series = load_csv(file.path(), &InputConfig::default()).unwrap();

        assert_eq!(series.len(), 3);
        assert!(series.timestamps[0].is_some());
        assert!(series.timestamps[2].is_none());
        assert_eq!(series.columns.len(), 2);
        assert_eq!(series.columns[0].name, "h");
        assert_eq!(series.columns[0].values, vec![Some(10.5), None, Some(12.0)]);
    }

    #[test]
    fn test_load_csv_missing_time_column() {
        let file = write_csv("date,h\n2023-06-01 00:00,1\n");
        assert!(matches!(
            load_csv(file.path(), &InputConfig::default()),
            Err(FluxQcError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_load_csv_missing_file() {
        assert!(matches!(
            load_csv(Path::new("/nonexistent/flux.csv"), &InputConfig::default()),
            Err(FluxQcError::InputNotFound { .. })
        ));
    }
}
