//! Configuration management and validation.
//!
//! Provides immutable, per-family filter configuration plus the input,
//! regularization and output settings. Everything deserializes from TOML and
//! missing keys fall back to defaults; a filter family only runs for the
//! variables named in its group.

use crate::constants::{
    DEFAULT_DATETIME_FORMAT, DEFAULT_FREQUENCY_HORIZON, DEFAULT_FREQUENCY_WINDOW,
    DEFAULT_HAMPEL_HALF_WINDOW, DEFAULT_HAMPEL_Z, DEFAULT_MAD_Z, DEFAULT_MIN_DAILY_SAMPLES,
    DEFAULT_NA_VALUES, DEFAULT_QC_THRESHOLD, DEFAULT_WINDOW_DAYS, DEFAULT_WINDOW_SIGMAS, columns,
};
use crate::error::{FluxQcError, Result};
use crate::models::DateRange;
use crate::rolling::WindowAnchor;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Top-level configuration for a quality-control run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QcConfig {
    pub input: InputConfig,
    pub regularization: RegularizationConfig,
    pub filters: FilterConfig,
    pub output: OutputConfig,
}

impl QcConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: QcConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FluxQcError::configuration(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!(
            "Loaded configuration from {} ({} filter groups configured)",
            path.display(),
            config.filters.configured_groups()
        );
        Ok(config)
    }

    /// Check settings that would make the whole run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.input.time_column.trim().is_empty() {
            return Err(FluxQcError::configuration("input.time_column is empty"));
        }
        if self.regularization.detection_window == 0 {
            return Err(FluxQcError::configuration(
                "regularization.detection_window must be at least 1",
            ));
        }
        if self.regularization.search_horizon == 0 {
            return Err(FluxQcError::configuration(
                "regularization.search_horizon must be at least 1",
            ));
        }
        Ok(())
    }
}

/// How the input file is read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Name of the timestamp column
    pub time_column: String,

    /// chrono format string of the timestamp column
    pub datetime_format: String,

    /// Field separator
    pub separator: char,

    /// Cell values read as missing
    pub na_values: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            time_column: columns::TIMESTAMP.to_string(),
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
            separator: ',',
            na_values: DEFAULT_NA_VALUES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Timestamp regularization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegularizationConfig {
    /// Force the sampling step instead of detecting it
    pub frequency_minutes: Option<i64>,

    /// Consecutive equal deltas needed to accept a frequency
    pub detection_window: usize,

    /// Delta windows scanned before detection fails
    pub search_horizon: usize,
}

impl Default for RegularizationConfig {
    fn default() -> Self {
        Self {
            frequency_minutes: None,
            detection_window: DEFAULT_FREQUENCY_WINDOW,
            search_horizon: DEFAULT_FREQUENCY_HORIZON,
        }
    }
}

/// Export file format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Parquet,
    Csv,
}

/// Export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,

    /// Write one `{variable}_valid` combined-mask column per filtered variable
    pub include_combined: bool,

    /// Write one `{variable}_filtered` column with rejected values nulled
    pub include_masked: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Parquet,
            include_combined: true,
            include_masked: false,
        }
    }
}

// =============================================================================
// Filter families
// =============================================================================

/// Variable derived as the sum of two columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualVariable {
    /// Component whose quality code the derived variable inherits
    pub primary: String,
    pub secondary: String,
}

/// Quality-code threshold for one variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityRule {
    /// Codes above this value are rejected
    pub threshold: i64,

    /// Code column, `qc_{variable}` (or the primary component's) when absent
    pub code_column: Option<String>,
}

impl Default for QualityRule {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_QC_THRESHOLD,
            code_column: None,
        }
    }
}

/// Gas-analyzer signal-strength requirement for one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalStrengthRule {
    /// Companion signal-strength column
    pub column: String,

    /// Samples with a signal strength below this are rejected
    pub min: f64,

    /// Variables measured by this channel
    pub variables: Vec<String>,
}

/// Relative-humidity ceiling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumidityRule {
    #[serde(default = "default_rh_column")]
    pub column: String,
    pub max: f64,
    #[serde(default = "default_fluxes")]
    pub variables: Vec<String>,
}

/// Rain event rejection with a settling tail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RainRule {
    #[serde(default = "default_rain_column")]
    pub column: String,

    /// Precipitation above this value marks a rain sample
    pub limit: f64,

    /// Samples after each rain sample that are rejected too
    #[serde(default)]
    pub forward_samples: usize,

    #[serde(default = "default_fluxes")]
    pub variables: Vec<String>,
}

/// Closed plausibility interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeRule {
    pub min: f64,
    pub max: f64,
}

/// Insolation-dependent plausibility ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayNightConfig {
    #[serde(default = "default_insolation_column")]
    pub insolation_column: String,

    /// Insolation below this is night, at or above is day
    pub threshold: f64,

    #[serde(default = "enabled")]
    pub night_enabled: bool,

    #[serde(default = "enabled")]
    pub day_enabled: bool,

    /// Night-time [min, max] per variable
    #[serde(default)]
    pub night: BTreeMap<String, RangeRule>,

    /// Day-time maximum per variable
    #[serde(default)]
    pub day: BTreeMap<String, f64>,
}

/// Plausibility interval enforced only inside the given periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinterRule {
    pub min: f64,
    pub max: f64,
    pub periods: Vec<DateRange>,
}

/// Absolute bounds, inclusive on both sides
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundRule {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Absolute-bound family with its clamped variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbsoluteConfig {
    pub bounds: BTreeMap<String, BoundRule>,

    /// Variables clamped down to their max instead of rejected
    pub clamp_upper: Vec<String>,

    /// Variables clamped up to their min instead of rejected
    pub clamp_lower: Vec<String>,
}

impl Default for AbsoluteConfig {
    fn default() -> Self {
        Self {
            bounds: BTreeMap::new(),
            clamp_upper: columns::CLAMP_UPPER.iter().map(|s| s.to_string()).collect(),
            clamp_lower: columns::CLAMP_LOWER.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Percentile band, both ends as fractions in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantileRule {
    pub lower: f64,
    pub upper: f64,
}

/// Rolling mean ± sigmas × residual std
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowRule {
    pub days: usize,
    pub sigmas: f64,
    pub min_daily_samples: usize,
    pub anchor: WindowAnchor,
}

impl Default for WindowRule {
    fn default() -> Self {
        Self {
            days: DEFAULT_WINDOW_DAYS,
            sigmas: DEFAULT_WINDOW_SIGMAS,
            min_daily_samples: DEFAULT_MIN_DAILY_SAMPLES,
            anchor: WindowAnchor::Centered,
        }
    }
}

/// Global MAD pre-pass followed by a sliding Hampel identifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HampelRule {
    pub mad_z: f64,
    pub hampel_z: f64,
    /// Neighbours on each side of the point
    pub half_window: usize,
}

impl Default for HampelRule {
    fn default() -> Self {
        Self {
            mad_z: DEFAULT_MAD_Z,
            hampel_z: DEFAULT_HAMPEL_Z,
            half_window: DEFAULT_HAMPEL_HALF_WINDOW,
        }
    }
}

/// Flag value forced by a manual override
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualAction {
    #[default]
    Reject,
    Accept,
}

impl ManualAction {
    pub fn flag(&self) -> bool {
        matches!(self, ManualAction::Accept)
    }
}

/// Operator-specified closed period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualRule {
    pub start: NaiveDateTime,
    pub stop: NaiveDateTime,
    #[serde(default)]
    pub action: ManualAction,
}

impl ManualRule {
    pub fn range(&self) -> DateRange {
        DateRange::new(self.start, self.stop)
    }
}

/// Every filter family, keyed by variable (or channel for signal strength)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub virtual_variables: BTreeMap<String, VirtualVariable>,
    pub quality: BTreeMap<String, QualityRule>,
    pub signal_strength: BTreeMap<String, SignalStrengthRule>,
    pub humidity: Option<HumidityRule>,
    pub rain: Option<RainRule>,
    pub day_night: Option<DayNightConfig>,
    pub winter: BTreeMap<String, WinterRule>,
    pub absolute: AbsoluteConfig,
    pub quantile: BTreeMap<String, QuantileRule>,
    pub window: BTreeMap<String, WindowRule>,
    pub mad_hampel: BTreeMap<String, HampelRule>,
    pub manual: BTreeMap<String, Vec<ManualRule>>,
}

impl FilterConfig {
    /// Number of filter groups with at least one entry
    pub fn configured_groups(&self) -> usize {
        [
            !self.virtual_variables.is_empty(),
            !self.quality.is_empty(),
            !self.signal_strength.is_empty(),
            self.humidity.is_some(),
            self.rain.is_some(),
            self.day_night.is_some(),
            !self.winter.is_empty(),
            !self.absolute.bounds.is_empty(),
            !self.quantile.is_empty(),
            !self.window.is_empty(),
            !self.mad_hampel.is_empty(),
            !self.manual.is_empty(),
        ]
        .iter()
        .filter(|configured| **configured)
        .count()
    }

    /// Quality-code column for `variable`, following virtual-variable inheritance
    pub fn quality_code_column(&self, variable: &str, rule: &QualityRule) -> String {
        if let Some(column) = &rule.code_column {
            return column.clone();
        }
        match self.virtual_variables.get(variable) {
            Some(derived) => crate::constants::quality_code_column(&derived.primary),
            None => crate::constants::quality_code_column(variable),
        }
    }

    pub fn with_virtual_variable(
        mut self,
        variable: &str,
        primary: &str,
        secondary: &str,
    ) -> Self {
        self.virtual_variables.insert(
            variable.to_string(),
            VirtualVariable {
                primary: primary.to_string(),
                secondary: secondary.to_string(),
            },
        );
        self
    }

    pub fn with_quality(mut self, variable: &str, threshold: i64) -> Self {
        self.quality.insert(
            variable.to_string(),
            QualityRule {
                threshold,
                code_column: None,
            },
        );
        self
    }

    pub fn with_signal_strength(mut self, channel: &str, rule: SignalStrengthRule) -> Self {
        self.signal_strength.insert(channel.to_string(), rule);
        self
    }

    pub fn with_humidity(mut self, rule: HumidityRule) -> Self {
        self.humidity = Some(rule);
        self
    }

    pub fn with_rain(mut self, rule: RainRule) -> Self {
        self.rain = Some(rule);
        self
    }

    pub fn with_day_night(mut self, config: DayNightConfig) -> Self {
        self.day_night = Some(config);
        self
    }

    pub fn with_winter(mut self, variable: &str, rule: WinterRule) -> Self {
        self.winter.insert(variable.to_string(), rule);
        self
    }

    pub fn with_bounds(mut self, variable: &str, min: Option<f64>, max: Option<f64>) -> Self {
        self.absolute
            .bounds
            .insert(variable.to_string(), BoundRule { min, max });
        self
    }

    pub fn with_quantile(mut self, variable: &str, lower: f64, upper: f64) -> Self {
        self.quantile
            .insert(variable.to_string(), QuantileRule { lower, upper });
        self
    }

    pub fn with_window(mut self, variable: &str, rule: WindowRule) -> Self {
        self.window.insert(variable.to_string(), rule);
        self
    }

    pub fn with_mad_hampel(mut self, variable: &str, rule: HampelRule) -> Self {
        self.mad_hampel.insert(variable.to_string(), rule);
        self
    }

    pub fn with_manual(mut self, variable: &str, rule: ManualRule) -> Self {
        self.manual.entry(variable.to_string()).or_default().push(rule);
        self
    }
}

fn default_rh_column() -> String {
    columns::RH.to_string()
}

fn default_rain_column() -> String {
    columns::P_RAIN.to_string()
}

fn default_insolation_column() -> String {
    columns::SWIN.to_string()
}

fn default_fluxes() -> Vec<String> {
    columns::DEFAULT_FLUXES.iter().map(|s| s.to_string()).collect()
}

fn enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[input]
time_column = "TIMESTAMP"
datetime_format = "%Y-%m-%d %H:%M:%S"

[regularization]
frequency_minutes = 30

[filters.virtual_variables.nee]
primary = "co2_flux"
secondary = "co2_strg"

[filters.quality.co2_flux]
threshold = 1

[filters.quality.nee]
threshold = 2

[filters.signal_strength.co2]
column = "co2_signal_strength"
min = 80.0
variables = ["co2_flux", "nee"]

[filters.rain]
limit = 0.1
forward_samples = 2

[filters.day_night]
threshold = 10.0
day_enabled = false

[filters.day_night.night.nee]
min = -2.0
max = 15.0

[filters.winter.nee]
min = 0.0
max = 5.0
periods = [{ start = "2022-12-01T00:00:00", stop = "2023-02-28T23:30:00" }]

[filters.absolute.bounds.rh]
min = 0.0
max = 100.0

[filters.quantile.le]
lower = 0.01
upper = 0.99

[filters.window.nee]
days = 7
sigmas = 3.5

[[filters.manual.ch4_flux]]
start = "2023-01-10T00:00:00"
stop = "2023-01-12T00:00:00"

[output]
format = "csv"
include_masked = true
"#;

    #[test]
    fn test_parse_sample_configuration() {
        let config = QcConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.input.time_column, "TIMESTAMP");
        assert_eq!(config.input.separator, ',');
        assert_eq!(config.regularization.frequency_minutes, Some(30));
        assert_eq!(config.regularization.detection_window, DEFAULT_FREQUENCY_WINDOW);

        let filters = &config.filters;
        assert_eq!(filters.quality["nee"].threshold, 2);
        assert_eq!(filters.signal_strength["co2"].variables.len(), 2);

        let rain = filters.rain.as_ref().unwrap();
        assert_eq!(rain.column, columns::P_RAIN);
        assert_eq!(rain.forward_samples, 2);
        assert_eq!(rain.variables.len(), columns::DEFAULT_FLUXES.len());

        let day_night = filters.day_night.as_ref().unwrap();
        assert!(day_night.night_enabled);
        assert!(!day_night.day_enabled);
        assert_eq!(day_night.insolation_column, columns::SWIN);

        assert_eq!(filters.winter["nee"].periods.len(), 1);
        assert_eq!(filters.absolute.clamp_upper, vec![columns::RH.to_string()]);
        assert_eq!(filters.window["nee"].days, 7);
        assert_eq!(
            filters.window["nee"].min_daily_samples,
            DEFAULT_MIN_DAILY_SAMPLES
        );
        assert_eq!(filters.manual["ch4_flux"][0].action, ManualAction::Reject);

        assert_eq!(config.output.format, OutputFormat::Csv);
        assert!(config.output.include_combined);
        assert!(config.output.include_masked);
        assert_eq!(filters.configured_groups(), 10);
    }

    #[test]
    fn test_virtual_variable_inherits_primary_code() {
        let config = QcConfig::from_toml_str(SAMPLE).unwrap();
        let filters = &config.filters;

        assert_eq!(
            filters.quality_code_column("nee", &filters.quality["nee"]),
            "qc_co2_flux"
        );
        assert_eq!(
            filters.quality_code_column("co2_flux", &filters.quality["co2_flux"]),
            "qc_co2_flux"
        );

        let explicit = QualityRule {
            threshold: 1,
            code_column: Some("co2_qc".to_string()),
        };
        assert_eq!(filters.quality_code_column("nee", &explicit), "co2_qc");
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = QcConfig::from_toml_str("").unwrap();
        assert_eq!(config, QcConfig::default());
        assert_eq!(config.filters.configured_groups(), 0);
    }

    #[test]
    fn test_invalid_regularization_rejected() {
        let result = QcConfig::from_toml_str("[regularization]\ndetection_window = 0\n");
        assert!(matches!(result, Err(FluxQcError::Configuration { .. })));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let result = QcConfig::from_toml_str("[filters.quality.nee\nthreshold = 1");
        assert!(matches!(result, Err(FluxQcError::ConfigParse(_))));
    }
}
