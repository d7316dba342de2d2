//! Filter provenance registry and mask combination.
//!
//! The registry records, per variable, the ordered list of filter instances
//! stamped onto the table. The combined mask of a variable is the AND of all
//! of its registered flag columns; downstream consumers only ever look at
//! that mask.

use crate::error::Result;
use crate::events::{EventSink, FilterEvent};
use crate::models::{FilterId, FluxTable};
use std::collections::BTreeMap;

/// Variable → ordered filter instances
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterRegistry {
    entries: BTreeMap<String, Vec<FilterId>>,
}

/// Frozen copy of a registry, used to undo filters applied after it was taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySnapshot(FilterRegistry);

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp `flag` for `id` and record it for the id's variable
    ///
    /// Registering an id twice replaces the stamped column and emits
    /// [`FilterEvent::FilterOverwritten`]; the id keeps its original position.
    ///
    /// # Arguments
    ///
    /// * `table` - Table receiving the flag column
    /// * `id` - Variable and filter kind naming the column
    /// * `flag` - One entry per row, `true` where the sample passes
    /// * `events` - Sink receiving the overwrite warning
    ///
    /// # Errors
    ///
    /// Fails with `LengthMismatch` when `flag` does not cover every row
    pub fn register(
        &mut self,
        table: &mut FluxTable,
        id: FilterId,
        flag: Vec<bool>,
        events: &mut dyn EventSink,
    ) -> Result<()> {
        let replaced = table.stamp_flag(id.clone(), flag)?;
        let list = self.entries.entry(id.variable.clone()).or_default();
        if list.contains(&id) {
            events.emit(FilterEvent::FilterOverwritten { id });
        } else {
            if replaced {
                // Column left over from a restored snapshot, now registered again
                events.emit(FilterEvent::FilterOverwritten { id: id.clone() });
            }
            list.push(id);
        }
        Ok(())
    }

    pub fn is_registered(&self, id: &FilterId) -> bool {
        self.entries
            .get(&id.variable)
            .is_some_and(|list| list.contains(id))
    }

    pub fn filters_for(&self, variable: &str) -> &[FilterId] {
        self.entries
            .get(variable)
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Total number of registered filter instances
    pub fn len(&self) -> usize {
        self.entries.values().map(|list| list.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// AND of every registered flag column of `variable`
    ///
    /// Unregistered variables pass everywhere.
    pub fn combined_mask(&self, table: &FluxTable, variable: &str) -> Vec<bool> {
        let mut mask = vec![true; table.len()];
        for id in self.filters_for(variable) {
            if let Some(flag) = table.flag(id) {
                for (m, f) in mask.iter_mut().zip(flag) {
                    *m &= *f;
                }
            }
        }
        mask
    }

    /// Row indices currently passing every filter of `variable`
    pub fn current_pass_subset(&self, table: &FluxTable, variable: &str) -> Vec<usize> {
        self.combined_mask(table, variable)
            .iter()
            .enumerate()
            .filter_map(|(row, pass)| pass.then_some(row))
            .collect()
    }

    /// AND of every flag of `id.variable` except `id` itself
    ///
    /// Re-running a filter therefore sees the same upstream state as its
    /// first run did.
    pub fn upstream_mask(&self, table: &FluxTable, id: &FilterId) -> Vec<bool> {
        let mut mask = vec![true; table.len()];
        for other in self.filters_for(&id.variable).iter().filter(|f| *f != id) {
            if let Some(flag) = table.flag(other) {
                for (m, f) in mask.iter_mut().zip(flag) {
                    *m &= *f;
                }
            }
        }
        mask
    }

    /// Row indices passing every filter of `id.variable` except `id`
    pub fn upstream_subset(&self, table: &FluxTable, id: &FilterId) -> Vec<usize> {
        self.upstream_mask(table, id)
            .iter()
            .enumerate()
            .filter_map(|(row, pass)| pass.then_some(row))
            .collect()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot(self.clone())
    }

    /// Return to a previously taken snapshot
    ///
    /// Flag columns stamped after the snapshot stay on the table but no longer
    /// contribute to any combined mask.
    pub fn restore(&mut self, snapshot: RegistrySnapshot) {
        *self = snapshot.0;
    }
}
