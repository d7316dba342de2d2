//! Application constants for flux quality control
//!
//! This module contains the column vocabulary, default parameters and
//! file-format constants used throughout the processor.

// =============================================================================
// Column Vocabulary
// =============================================================================

/// Standard column names for eddy-covariance station exports
pub mod columns {
    // Temporal columns
    pub const TIMESTAMP: &str = "timestamp";

    // Flux variables
    pub const CO2_FLUX: &str = "co2_flux";
    pub const CO2_STORAGE: &str = "co2_strg";
    pub const NEE: &str = "nee";
    pub const CH4_FLUX: &str = "ch4_flux";
    pub const H: &str = "h";
    pub const LE: &str = "le";

    // Meteorological variables
    pub const RH: &str = "rh";
    pub const P_RAIN: &str = "p_rain";
    pub const SWIN: &str = "swin";
    pub const PPFD: &str = "ppfd";
    pub const TA: &str = "ta";

    // Instrument diagnostics
    pub const CO2_SIGNAL_STRENGTH: &str = "co2_signal_strength";
    pub const CH4_SIGNAL_STRENGTH: &str = "rssi_77_mean";

    /// Prefix of the paired quality-code column (`qc_co2_flux`, ...)
    pub const QC_PREFIX: &str = "qc_";

    /// Fluxes that meteorological filters target when not configured otherwise
    pub const DEFAULT_FLUXES: &[&str] = &[CO2_FLUX, NEE, CH4_FLUX, H, LE];

    /// Variables whose values are clamped to their upper bound instead of rejected
    pub const CLAMP_UPPER: &[&str] = &[RH];

    /// Variables whose values are clamped to their lower bound instead of rejected
    pub const CLAMP_LOWER: &[&str] = &[SWIN, PPFD];
}

/// Name of the quality-code column paired with `variable`
pub fn quality_code_column(variable: &str) -> String {
    format!("{}{}", columns::QC_PREFIX, variable)
}

// =============================================================================
// Regularization Defaults
// =============================================================================

/// Number of consecutive equal deltas required to accept a frequency
pub const DEFAULT_FREQUENCY_WINDOW: usize = 5;

/// Number of delta windows scanned before frequency detection gives up
pub const DEFAULT_FREQUENCY_HORIZON: usize = 100;

/// Number of off-grid timestamps tolerated (dropped) during reindexing
pub const OFF_GRID_TOLERANCE: usize = 1;

/// Seconds per day, used to derive samples per day from the table frequency
pub const SECONDS_PER_DAY: i64 = 86_400;

// =============================================================================
// Filter Defaults
// =============================================================================

/// Consistency constant turning a MAD into a normal-equivalent sigma
pub const MAD_TO_SIGMA: f64 = 1.4826;

/// Default quality-code threshold (codes above are rejected)
pub const DEFAULT_QC_THRESHOLD: i64 = 1;

/// Default rolling window length in days for the deviation filter
pub const DEFAULT_WINDOW_DAYS: usize = 10;

/// Default sigma multiplier for the deviation filter
pub const DEFAULT_WINDOW_SIGMAS: f64 = 3.0;

/// Default minimum number of samples per day inside a rolling window
pub const DEFAULT_MIN_DAILY_SAMPLES: usize = 5;

/// Default z multiplier for the global MAD pre-pass
pub const DEFAULT_MAD_Z: f64 = 7.0;

/// Default z multiplier for the Hampel identifier
pub const DEFAULT_HAMPEL_Z: f64 = 3.5;

/// Default Hampel half window in samples (one day at 30 minutes)
pub const DEFAULT_HAMPEL_HALF_WINDOW: usize = 24;

// =============================================================================
// Input / Output Constants
// =============================================================================

/// Default datetime format of the input time column
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Values treated as missing when loading delimited text
pub const DEFAULT_NA_VALUES: &[&str] = &["", "NA", "NaN", "nan", "-9999", "-9999.0"];

/// Suffix of exported combined-mask columns
pub const VALID_SUFFIX: &str = "_valid";

/// Suffix of exported masked-value columns
pub const FILTERED_SUFFIX: &str = "_filtered";
