//! Indirect-call tables.

use crate::{Index, Limits, INVALID_INDEX};

/// A `funcref` table instance owned by the environment.
///
/// Slots hold environment-global function indices; unfilled slots carry
/// [`INVALID_INDEX`]. Element segments are written by the translator's
/// deferred-commit step.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub limits: Limits,
    pub func_indexes: Vec<Index>,
}

impl Table {
    /// Allocate a table sized to the initial entry count, all slots empty.
    pub fn new(limits: Limits) -> Table {
        Table {
            limits,
            func_indexes: vec![INVALID_INDEX; limits.initial as usize],
        }
    }

    pub fn size(&self) -> usize {
        self.func_indexes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_sized_to_initial() {
        let table = Table::new(Limits::new(4, Some(8)));
        assert_eq!(table.size(), 4);
        assert!(table.func_indexes.iter().all(|&i| i == INVALID_INDEX));
    }

    #[test]
    fn empty_table() {
        let table = Table::new(Limits::new(0, None));
        assert_eq!(table.size(), 0);
    }
}
