//! Tests for the MAD pre-pass and Hampel identifier

use super::*;
use crate::config::HampelRule;
use crate::filters::apply_mad_hampel;
use crate::filters::hampel::{hampel_outliers, mad, median};
use std::collections::BTreeMap;

fn hampel_rules(variable: &str) -> BTreeMap<String, HampelRule> {
    let mut rules = BTreeMap::new();
    rules.insert(variable.to_string(), HampelRule::default());
    rules
}

/// Smooth oscillation with a small deterministic jitter
fn smooth_series(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let jitter = ((i * 7919) % 13) as f64 / 13.0 * 0.2;
            5.0 + 0.5 * (i as f64 * 0.3).sin() + jitter
        })
        .collect()
}

#[test]
fn test_median_and_mad() {
    let mut odd = vec![3.0, 1.0, 2.0];
    assert_eq!(median(&mut odd), Some(2.0));
    let mut even = vec![4.0, 1.0, 3.0, 2.0];
    assert_eq!(median(&mut even), Some(2.5));
    assert_eq!(median(&mut []), None);

    // deviations from 2: 1, 1, 0, 2, 7 -> median 1
    assert_eq!(mad(&[1.0, 3.0, 2.0, 4.0, 9.0], 2.0), Some(1.0));
}

#[test]
fn test_hampel_flags_local_outlier() {
    let mut values = smooth_series(100);
    values[50] += 3.0;
    let outliers = hampel_outliers(&values, 24, 3.5);
    assert_eq!(rejected_rows(&outliers.iter().map(|o| !o).collect::<Vec<_>>()), vec![50]);
}

#[test]
fn test_hampel_constant_window_never_rejects() {
    let values = vec![1.0; 20];
    assert!(hampel_outliers(&values, 3, 3.5).iter().all(|o| !o));
}

#[test]
fn test_mad_hampel_gross_and_local_outliers() {
    let mut values = smooth_series(300);
    // gross outliers caught by the global pre-pass
    values[50] += 30.0;
    values[120] -= 25.0;
    // moderate outlier that only the sliding window catches
    values[200] += 3.0;
    let mut table = create_test_table(&[("nee", present(&values))]);
    let (mut registry, mut sink) = create_test_context();

    let outcome =
        apply_mad_hampel(&mut table, &mut registry, &hampel_rules("nee"), &mut sink).unwrap();

    let flag = flag_of(&table, "nee", FilterKind::MadHampel);
    assert_eq!(rejected_rows(&flag), vec![50, 120, 200]);
    assert_eq!(outcome.applied[0].evaluated, 300);
}

#[test]
fn test_mad_hampel_ignores_rows_outside_subset() {
    let mut values = smooth_series(120);
    values[10] = 500.0;
    let mut table = create_test_table(&[("h", present(&values))]);
    let (mut registry, mut sink) = create_test_context();
    let mut upstream = vec![true; 120];
    upstream[10] = false;
    registry
        .register(
            &mut table,
            FilterId::new("h", FilterKind::AbsoluteBound),
            upstream,
            &mut sink,
        )
        .unwrap();

    apply_mad_hampel(&mut table, &mut registry, &hampel_rules("h"), &mut sink).unwrap();

    let flag = flag_of(&table, "h", FilterKind::MadHampel);
    assert!(flag.iter().all(|pass| *pass));
    assert!(!registry.combined_mask(&table, "h")[10]);
}

#[test]
fn test_mad_hampel_missing_values_pass() {
    let mut values: Vec<Option<f64>> = smooth_series(80).into_iter().map(Some).collect();
    values[5] = None;
    values[6] = None;
    let mut table = create_test_table(&[("le", values)]);
    let (mut registry, mut sink) = create_test_context();

    let outcome =
        apply_mad_hampel(&mut table, &mut registry, &hampel_rules("le"), &mut sink).unwrap();

    let flag = flag_of(&table, "le", FilterKind::MadHampel);
    assert!(flag[5] && flag[6]);
    assert_eq!(outcome.applied[0].evaluated, 78);
}
