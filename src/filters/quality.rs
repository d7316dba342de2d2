//! Upstream quality-code filter.

use super::{FilterStage, StageOutcome, StageRun, flag_present};
use crate::config::FilterConfig;
use crate::error::Result;
use crate::events::{EventSink, SkipReason};
use crate::models::{FilterId, FilterKind, FluxTable};
use crate::registry::FilterRegistry;

/// Reject samples whose quality code exceeds the variable's threshold
///
/// The code column defaults to `qc_{variable}`; virtual variables read the
/// code of their primary component. A missing code never rejects.
///
/// # Arguments
///
/// * `table` - Regularized table; one flag column is stamped per variable
/// * `registry` - Registry recording the stamped filters
/// * `config` - Filter configuration holding the per-variable thresholds
/// * `events` - Sink receiving skip and rejection events
///
/// # Returns
///
/// Stage outcome with the applied filters and their rejection counts
pub fn apply_quality_codes(
    table: &mut FluxTable,
    registry: &mut FilterRegistry,
    config: &FilterConfig,
    events: &mut dyn EventSink,
) -> Result<StageOutcome> {
    let mut run = StageRun::start(FilterStage::QualityCode, events);

    for (variable, rule) in &config.quality {
        if !table.has_column(variable) {
            run.skip(variable, SkipReason::MissingVariable);
            continue;
        }
        let code_column = config.quality_code_column(variable, rule);
        let Some(codes) = table.column(&code_column) else {
            run.skip(variable, SkipReason::MissingCompanion(code_column));
            continue;
        };

        let threshold = rule.threshold as f64;
        let (flag, evaluated) = flag_present(codes, |_, code| code <= threshold);
        run.stamp(
            table,
            registry,
            FilterId::new(variable.as_str(), FilterKind::QualityCode),
            flag,
            evaluated,
            format!("{code_column} <= {}", rule.threshold),
        )?;
    }

    Ok(run.finish())
}
