//! Virtual variables computed from two raw columns.

use super::{FilterStage, StageOutcome, StageRun};
use crate::config::VirtualVariable;
use crate::error::Result;
use crate::events::{EventSink, FilterEvent, SkipReason};
use crate::models::FluxTable;
use std::collections::BTreeMap;

/// Add each virtual variable as `primary + secondary`
///
/// A row is missing when either component is missing. An input column with
/// the same name is kept and the derivation skipped.
pub fn derive_virtual_variables(
    table: &mut FluxTable,
    variables: &BTreeMap<String, VirtualVariable>,
    events: &mut dyn EventSink,
) -> Result<StageOutcome> {
    let mut run = StageRun::start(FilterStage::VirtualVariables, events);

    for (name, derived) in variables {
        if table.has_column(name) {
            run.skip(name, SkipReason::AlreadyPresent);
            continue;
        }
        let (Some(primary), Some(secondary)) = (
            table.column(&derived.primary),
            table.column(&derived.secondary),
        ) else {
            let missing = if table.has_column(&derived.primary) {
                &derived.secondary
            } else {
                &derived.primary
            };
            run.skip(name, SkipReason::MissingCompanion(missing.clone()));
            continue;
        };

        let values = primary
            .iter()
            .zip(secondary)
            .map(|(a, b)| Some((*a)? + (*b)?))
            .collect();
        table.with_column(name.clone(), values)?;
        run.emit(FilterEvent::VariableDerived {
            variable: name.clone(),
            primary: derived.primary.clone(),
            secondary: derived.secondary.clone(),
        });
    }

    Ok(run.finish())
}
