//! Tests for stage ordering and whole-run properties

use super::*;
use crate::config::{FilterConfig, HampelRule, ManualAction, ManualRule, WinterRule};
use crate::events::{FilterEvent, RecordingSink};
use crate::filters::FilterStage;
use crate::models::{DateRange, FilterId, FilterKind, FluxTable};
use crate::processor::FilterProcessor;
use crate::registry::FilterRegistry;

#[test]
fn test_stage_order_is_fixed() {
    assert_eq!(FilterStage::ORDER.first(), Some(&FilterStage::VirtualVariables));
    assert_eq!(FilterStage::ORDER.last(), Some(&FilterStage::Manual));
    let quality = FilterStage::ORDER
        .iter()
        .position(|s| *s == FilterStage::QualityCode);
    let quantile = FilterStage::ORDER
        .iter()
        .position(|s| *s == FilterStage::Quantile);
    assert!(quality < quantile);
}

#[test]
fn test_stages_enabled_follow_configuration() {
    let processor = FilterProcessor::new(create_station_config());
    assert_eq!(
        processor.stages_enabled(),
        vec![
            FilterStage::VirtualVariables,
            FilterStage::QualityCode,
            FilterStage::Rain,
            FilterStage::AbsoluteBound,
            FilterStage::Quantile,
            FilterStage::WindowDeviation,
        ]
    );
    assert!(FilterProcessor::default().stages_enabled().is_empty());
}

#[test]
fn test_run_registers_filters_in_stage_order() {
    let processor = FilterProcessor::new(create_station_config());
    let mut sink = RecordingSink::new();

    let outcome = processor.run(create_station_table(), &mut sink).unwrap();

    let kinds: Vec<FilterKind> = outcome
        .registry
        .filters_for("h")
        .iter()
        .map(|id| id.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            FilterKind::QualityCode,
            FilterKind::Rain,
            FilterKind::AbsoluteBound,
            FilterKind::WindowDeviation,
        ]
    );

    let mask = outcome.registry.combined_mask(&outcome.table, "h");
    assert!(!mask[10], "quality code 2 rejected");
    assert!(!mask[20], "implausible value rejected");
    assert!(!mask[50] && !mask[51] && !mask[52] && mask[53], "rain cascade");
    assert!(outcome.table.has_column("nee"));
    assert_eq!(outcome.outcomes.len(), 6);
    assert_eq!(sink.warnings().count(), 0);
}

#[test]
fn test_statistics_see_upstream_rejections() {
    // the 5000 spike is removed by the bound before the window stage runs,
    // so it cannot inflate the rolling spread
    let processor = FilterProcessor::new(create_station_config());
    let outcome = processor
        .run(create_station_table(), &mut RecordingSink::new())
        .unwrap();

    let window = outcome
        .table
        .flag(&FilterId::new("h", FilterKind::WindowDeviation))
        .unwrap();
    assert!(window[20], "row outside the pass subset stays true");
    assert!(window.iter().all(|pass| *pass));
}

#[test]
fn test_rerunning_stage_is_idempotent() {
    let processor = FilterProcessor::new(create_station_config());
    let mut sink = RecordingSink::new();
    let mut outcome = processor.run(create_station_table(), &mut sink).unwrap();
    let before = outcome.registry.combined_mask(&outcome.table, "nee");
    let flag_before = outcome
        .table
        .flag(&FilterId::new("nee", FilterKind::Quantile))
        .unwrap()
        .to_vec();

    processor
        .apply_stage(
            FilterStage::Quantile,
            &mut outcome.table,
            &mut outcome.registry,
            &mut sink,
        )
        .unwrap();

    assert_eq!(outcome.registry.combined_mask(&outcome.table, "nee"), before);
    assert_eq!(
        outcome
            .table
            .flag(&FilterId::new("nee", FilterKind::Quantile))
            .unwrap(),
        flag_before.as_slice()
    );
    assert!(
        sink.events
            .iter()
            .any(|e| matches!(e, FilterEvent::FilterOverwritten { .. }))
    );
}

/// Station configuration plus winter, MAD+Hampel and manual rules on `h`
fn create_full_config() -> FilterConfig {
    create_station_config()
        .with_winter(
            "h",
            WinterRule {
                min: 30.0,
                max: 75.0,
                periods: vec![DateRange::new(at(2, 0, 0), at(2, 23, 30))],
            },
        )
        .with_mad_hampel(
            "h",
            HampelRule {
                mad_z: 7.0,
                hampel_z: 2.0,
                half_window: 6,
            },
        )
        .with_manual(
            "h",
            ManualRule {
                start: at(3, 6, 0),
                stop: at(3, 9, 0),
                action: ManualAction::Reject,
            },
        )
}

/// Apply the configured stages in order, up to and including `last`
fn run_through(
    processor: &FilterProcessor,
    last: FilterStage,
) -> (FluxTable, FilterRegistry, RecordingSink) {
    let mut table = create_station_table();
    let mut registry = FilterRegistry::new();
    let mut sink = RecordingSink::new();
    for stage in processor.stages_enabled() {
        processor
            .apply_stage(stage, &mut table, &mut registry, &mut sink)
            .unwrap();
        if stage == last {
            break;
        }
    }
    (table, registry, sink)
}

fn stamped_flags(table: &FluxTable) -> Vec<(FilterId, Vec<bool>)> {
    table
        .flags()
        .map(|(id, flag)| (id.clone(), flag.to_vec()))
        .collect()
}

/// Re-applying `stage` on the state it just produced changes nothing
fn assert_rerun_reproduces(stage: FilterStage) {
    let processor = FilterProcessor::new(create_full_config());
    let (mut table, mut registry, mut sink) = run_through(&processor, stage);
    let before = stamped_flags(&table);
    let order = registry.filters_for("h").to_vec();

    processor
        .apply_stage(stage, &mut table, &mut registry, &mut sink)
        .unwrap();

    assert_eq!(stamped_flags(&table), before, "{stage} changed a flag");
    assert_eq!(registry.filters_for("h"), order.as_slice());
}

#[test]
fn test_rerun_rain_is_idempotent() {
    assert_rerun_reproduces(FilterStage::Rain);
}

#[test]
fn test_rerun_winter_is_idempotent() {
    assert_rerun_reproduces(FilterStage::Winter);
}

#[test]
fn test_rerun_window_deviation_is_idempotent() {
    assert_rerun_reproduces(FilterStage::WindowDeviation);
}

#[test]
fn test_rerun_mad_hampel_is_idempotent() {
    assert_rerun_reproduces(FilterStage::MadHampel);
}

#[test]
fn test_rerun_manual_is_idempotent() {
    assert_rerun_reproduces(FilterStage::Manual);
}

#[test]
fn test_full_configuration_enables_every_stage_used() {
    let processor = FilterProcessor::new(create_full_config());
    let stages = processor.stages_enabled();
    for stage in [
        FilterStage::Rain,
        FilterStage::Winter,
        FilterStage::WindowDeviation,
        FilterStage::MadHampel,
        FilterStage::Manual,
    ] {
        assert!(stages.contains(&stage), "{stage} not enabled");
    }
}

#[test]
fn test_combined_mask_only_narrows_through_the_run() {
    let config = create_station_config();
    let processor = FilterProcessor::new(config);
    let mut table = create_station_table();
    let mut registry = FilterRegistry::new();
    let mut sink = RecordingSink::new();

    let mut previous = registry.combined_mask(&table, "h");
    for stage in processor.stages_enabled() {
        processor
            .apply_stage(stage, &mut table, &mut registry, &mut sink)
            .unwrap();
        let current = registry.combined_mask(&table, "h");
        for (before, after) in previous.iter().zip(&current) {
            assert!(*before || !*after, "{stage} re-admitted a row");
        }
        previous = current;
    }
}

#[test]
fn test_snapshot_restore_undoes_manual_override() {
    let config = create_station_config().with_manual(
        "h",
        ManualRule {
            start: at(1, 0, 0),
            stop: at(1, 12, 0),
            action: ManualAction::Reject,
        },
    );
    let processor = FilterProcessor::new(config);
    let mut table = create_station_table();
    let mut registry = FilterRegistry::new();
    let mut sink = RecordingSink::new();

    for stage in processor.stages_enabled() {
        if stage == FilterStage::Manual {
            break;
        }
        processor
            .apply_stage(stage, &mut table, &mut registry, &mut sink)
            .unwrap();
    }
    let snapshot = registry.snapshot();
    processor
        .apply_stage(FilterStage::Manual, &mut table, &mut registry, &mut sink)
        .unwrap();
    assert!(!registry.combined_mask(&table, "h")[5]);

    registry.restore(snapshot);
    assert!(registry.combined_mask(&table, "h")[5]);
    assert!(!registry.is_registered(&FilterId::new("h", FilterKind::Manual)));
}

#[test]
fn test_missing_variable_does_not_abort_run() {
    let config = create_station_config().with_quality("ch4_flux", 1);
    let processor = FilterProcessor::new(config);
    let mut sink = RecordingSink::new();

    let outcome = processor.run(create_station_table(), &mut sink).unwrap();

    assert!(outcome.registry.filters_for("ch4_flux").is_empty());
    assert_eq!(sink.warnings().count(), 1);
    assert!(!outcome.registry.filters_for("h").is_empty());
}
