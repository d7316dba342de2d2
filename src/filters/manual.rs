//! Date-range filters: seasonal plausibility ranges and operator overrides.
//!
//! Ranges are closed and clipped to the data coverage. A range entirely
//! outside the data is reported and ignored; a reversed range aborts the
//! variable's invocation.

use super::{FilterStage, StageOutcome, StageRun};
use crate::config::{ManualRule, WinterRule};
use crate::error::{FluxQcError, Result};
use crate::events::{EventSink, SkipReason};
use crate::models::{DateRange, FilterId, FilterKind, FluxTable};
use crate::registry::FilterRegistry;
use std::collections::BTreeMap;
use std::ops::Range;

/// Row ranges covered by each date range, paired with its position
///
/// Every range is validated before any is clipped, so one reversed range
/// rejects the whole set.
fn covered_rows(
    run: &mut StageRun<'_>,
    table: &FluxTable,
    variable: &str,
    ranges: &[DateRange],
) -> Result<Vec<(usize, Range<usize>)>> {
    for range in ranges {
        range.validate(variable)?;
    }
    let (Some(first), Some(last)) = (table.first_timestamp(), table.last_timestamp()) else {
        return Ok(Vec::new());
    };

    let mut covered = Vec::with_capacity(ranges.len());
    for (position, range) in ranges.iter().enumerate() {
        match range.clip_to(first, last) {
            Some(clipped) => covered.push((position, table.rows_in(&clipped))),
            None => run.range_skipped(variable, *range),
        }
    }
    Ok(covered)
}

/// Reject values outside `[min, max]` inside the configured periods only
///
/// # Arguments
///
/// * `table` - Regularized table
/// * `registry` - Registry recording the winter filter of each variable
/// * `rules` - Range and periods keyed by variable
/// * `events` - Sink receiving range and rejection events
///
/// # Returns
///
/// Stage outcome; a reversed period fails only its own variable
pub fn apply_winter_ranges(
    table: &mut FluxTable,
    registry: &mut FilterRegistry,
    rules: &BTreeMap<String, WinterRule>,
    events: &mut dyn EventSink,
) -> Result<StageOutcome> {
    let mut run = StageRun::start(FilterStage::Winter, events);

    for (variable, rule) in rules {
        if !table.has_column(variable) {
            run.skip(variable, SkipReason::MissingVariable);
            continue;
        }
        if rule.min > rule.max {
            let error = FluxQcError::invalid_parameter(
                run.stage().name(),
                variable.as_str(),
                format!("min {} exceeds max {}", rule.min, rule.max),
            );
            run.fail(variable, error)?;
            continue;
        }
        let covered = match covered_rows(&mut run, table, variable, &rule.periods) {
            Ok(covered) => covered,
            Err(error) => {
                run.fail(variable, error)?;
                continue;
            }
        };

        let values = table.column(variable).unwrap_or_default();
        let mut flag = vec![true; table.len()];
        let mut evaluated = 0;
        for (_, rows) in covered {
            for row in rows {
                if let Some(v) = values[row] {
                    evaluated += 1;
                    flag[row] = v >= rule.min && v <= rule.max;
                }
            }
        }
        run.stamp(
            table,
            registry,
            FilterId::new(variable.as_str(), FilterKind::Winter),
            flag,
            evaluated,
            format!(
                "[{}, {}] in {} periods",
                rule.min,
                rule.max,
                rule.periods.len()
            ),
        )?;
    }

    Ok(run.finish())
}

/// Force the flag inside operator-specified periods
///
/// Rows covered by a rule take that rule's action, later rules winning where
/// periods overlap. Rows outside every period pass.
///
/// # Arguments
///
/// * `rules` - Ordered overrides keyed by variable
///
/// # Returns
///
/// Stage outcome with one manual filter per variable
pub fn apply_manual_overrides(
    table: &mut FluxTable,
    registry: &mut FilterRegistry,
    rules: &BTreeMap<String, Vec<ManualRule>>,
    events: &mut dyn EventSink,
) -> Result<StageOutcome> {
    let mut run = StageRun::start(FilterStage::Manual, events);

    for (variable, variable_rules) in rules {
        if !table.has_column(variable) {
            run.skip(variable, SkipReason::MissingVariable);
            continue;
        }
        let ranges: Vec<DateRange> = variable_rules.iter().map(ManualRule::range).collect();
        let covered = match covered_rows(&mut run, table, variable, &ranges) {
            Ok(covered) => covered,
            Err(error) => {
                run.fail(variable, error)?;
                continue;
            }
        };

        let mut flag = vec![true; table.len()];
        let mut evaluated = 0;
        for (position, rows) in covered {
            let forced = variable_rules[position].action.flag();
            evaluated += rows.len();
            flag[rows].fill(forced);
        }
        run.stamp(
            table,
            registry,
            FilterId::new(variable.as_str(), FilterKind::Manual),
            flag,
            evaluated,
            format!("{} periods", variable_rules.len()),
        )?;
    }

    Ok(run.finish())
}
