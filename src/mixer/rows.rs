//! The mixer table: rows of (channel, operation, value).

use super::operation::{default_catalog, Operation};
use crate::midi::ChannelTarget;

/// Value a fresh row starts at.
pub const DEFAULT_VALUE: f64 = 0.5;

/// Fewest rows the table may hold.
pub const MIN_ROWS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixerRow {
    pub channel: ChannelTarget,
    pub operation: Operation,
    /// Normalized control value in [0, 1].
    pub value: f64,
}

impl MixerRow {
    pub fn new(channel: ChannelTarget, operation: Operation) -> Self {
        Self {
            channel,
            operation,
            value: DEFAULT_VALUE,
        }
    }

    /// Moves the value by `delta`, staying inside [0, 1].
    pub fn nudge(&mut self, delta: f64) {
        self.value = (self.value + delta).clamp(0.0, 1.0);
    }
}

#[derive(Debug, Clone)]
pub struct MixerTable {
    rows: Vec<MixerRow>,
    catalog: Vec<Operation>,
}

impl Default for MixerTable {
    fn default() -> Self {
        Self::new(default_catalog())
    }
}

impl MixerTable {
    /// A table offering `catalog`, starting with [`MIN_ROWS`] rows on all
    /// channels set to the first operation.
    pub fn new(catalog: Vec<Operation>) -> Self {
        let first = catalog.first().copied().unwrap_or(Operation::ControlChange(7));
        let catalog = if catalog.is_empty() { vec![first] } else { catalog };
        Self {
            rows: vec![MixerRow::new(ChannelTarget::All, first); MIN_ROWS],
            catalog,
        }
    }

    pub fn rows(&self) -> &[MixerRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MixerRow> {
        self.rows.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut MixerRow> {
        self.rows.get_mut(index)
    }

    pub fn catalog(&self) -> &[Operation] {
        &self.catalog
    }

    /// Inserts a copy of row `index` directly after it and returns the new
    /// row's index.
    ///
    /// The copy keeps the channel and operation but starts at
    /// [`DEFAULT_VALUE`]. An operation the catalog does not offer is replaced
    /// by the catalog's first entry. Out-of-range indices clone the last row.
    pub fn add_after(&mut self, index: usize) -> usize {
        let index = index.min(self.rows.len().saturating_sub(1));
        let source = self.rows[index];
        let operation = if self.catalog.contains(&source.operation) {
            source.operation
        } else {
            self.catalog[0]
        };
        self.rows
            .insert(index + 1, MixerRow::new(source.channel, operation));
        index + 1
    }

    /// Removes row `index`. Returns `false` and leaves the table untouched
    /// when only [`MIN_ROWS`] rows remain or the index is out of range.
    pub fn remove(&mut self, index: usize) -> bool {
        if self.rows.len() <= MIN_ROWS || index >= self.rows.len() {
            return false;
        }
        self.rows.remove(index);
        true
    }

    /// Steps row `index` through the catalog.
    pub fn cycle_operation(&mut self, index: usize, delta: isize) {
        let Some(row) = self.rows.get_mut(index) else {
            return;
        };
        let len = self.catalog.len() as isize;
        let current = self
            .catalog
            .iter()
            .position(|op| *op == row.operation)
            .unwrap_or(0) as isize;
        row.operation = self.catalog[(current + delta).rem_euclid(len) as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_table() {
        let table = MixerTable::default();
        assert_eq!(table.len(), 2);
        assert!(table.rows().iter().all(|r| r.value == DEFAULT_VALUE));
    }

    #[test]
    fn test_remove_keeps_two_rows() {
        let mut table = MixerTable::default();
        assert!(!table.remove(0));
        assert_eq!(table.len(), 2);

        table.add_after(0);
        assert_eq!(table.len(), 3);
        assert!(table.remove(1));
        assert_eq!(table.len(), 2);
        assert!(!table.remove(1));
    }

    #[test]
    fn test_add_after_clones_channel_and_operation() {
        let mut table = MixerTable::default();
        let op: Operation = "FineTuning".parse().unwrap();
        {
            let row = table.get_mut(1).unwrap();
            row.channel = ChannelTarget::Single(4);
            row.operation = op;
            row.value = 0.9;
        }

        let new = table.add_after(1);
        assert_eq!(new, 2);
        assert_eq!(
            table.get(2),
            Some(&MixerRow {
                channel: ChannelTarget::Single(4),
                operation: op,
                value: DEFAULT_VALUE
            })
        );
        // The source row keeps its value.
        assert_eq!(table.get(1).unwrap().value, 0.9);
    }

    #[test]
    fn test_add_after_falls_back_to_first_operation() {
        let catalog: Vec<Operation> = vec!["CC7".parse().unwrap(), "CC10".parse().unwrap()];
        let mut table = MixerTable::new(catalog.clone());
        table.get_mut(0).unwrap().operation = "CC64".parse().unwrap();

        table.add_after(0);
        assert_eq!(table.get(1).unwrap().operation, catalog[0]);
    }

    #[test]
    fn test_cycle_operation_wraps() {
        let mut table = MixerTable::default();
        let last = *table.catalog().last().unwrap();
        table.cycle_operation(0, -1);
        assert_eq!(table.get(0).unwrap().operation, last);
        table.cycle_operation(0, 1);
        assert_eq!(table.get(0).unwrap().operation, table.catalog()[0]);
    }

    #[test]
    fn test_nudge_clamps() {
        let mut row = MixerRow::new(ChannelTarget::All, Operation::FineTuning);
        row.nudge(0.8);
        assert_eq!(row.value, 1.0);
        row.nudge(-2.0);
        assert_eq!(row.value, 0.0);
    }
}
