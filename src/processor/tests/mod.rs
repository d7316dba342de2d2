//! Tests for the filter orchestrator
//!
//! Covers stage ordering, whole-run properties and the run summary.

pub mod pipeline_tests;

// Test helper functions and fixtures
use crate::config::{FilterConfig, RainRule, WindowRule};
use crate::models::FluxTable;
use crate::rolling::WindowAnchor;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

pub fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 6, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

/// Four days of half-hourly station data with a few planted problems
///
/// - `h` has a quality code of 2 at row 10 and an implausible value at row 20
/// - `p_rain` has a rain sample at row 50
/// - `co2_flux` + `co2_strg` make up `nee`
pub fn create_station_table() -> FluxTable {
    let len = 192;
    let mut table = FluxTable::uniform(at(1, 0, 0), TimeDelta::minutes(30), len).unwrap();

    let h: Vec<Option<f64>> = (0..len)
        .map(|i| {
            if i == 20 {
                Some(5000.0)
            } else {
                Some(50.0 + 30.0 * (i as f64 * 0.13).sin())
            }
        })
        .collect();
    let qc_h: Vec<Option<f64>> = (0..len)
        .map(|i| Some(if i == 10 { 2.0 } else { 0.0 }))
        .collect();
    let co2_flux: Vec<Option<f64>> = (0..len)
        .map(|i| Some(-2.0 + (i as f64 * 0.2).cos()))
        .collect();
    let co2_strg: Vec<Option<f64>> = (0..len).map(|_| Some(0.1)).collect();
    let p_rain: Vec<Option<f64>> = (0..len)
        .map(|i| Some(if i == 50 { 0.8 } else { 0.0 }))
        .collect();

    table.with_column("h", h).unwrap();
    table.with_column("qc_h", qc_h).unwrap();
    table.with_column("co2_flux", co2_flux).unwrap();
    table.with_column("co2_strg", co2_strg).unwrap();
    table.with_column("p_rain", p_rain).unwrap();
    table
}

/// Configuration touching several stage families
pub fn create_station_config() -> FilterConfig {
    FilterConfig::default()
        .with_virtual_variable("nee", "co2_flux", "co2_strg")
        .with_quality("h", 1)
        .with_rain(RainRule {
            column: "p_rain".to_string(),
            limit: 0.0,
            forward_samples: 2,
            variables: vec!["h".to_string(), "nee".to_string()],
        })
        .with_bounds("h", Some(-200.0), Some(800.0))
        .with_quantile("nee", 0.01, 0.99)
        .with_window(
            "h",
            WindowRule {
                days: 2,
                sigmas: 4.0,
                min_daily_samples: 5,
                anchor: WindowAnchor::Centered,
            },
        )
}
