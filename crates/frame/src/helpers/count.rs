use crate::column::ColumnTypes;
use crate::nodes::ActionHelper;
use crate::slot::SlotCells;
use quiver_core::Result;

/// Counts the entries reaching the action.
pub struct CountHelper {
    counts: SlotCells<u64>,
}

impl CountHelper {
    pub fn new(n_slots: usize) -> Self {
        Self {
            counts: SlotCells::new(n_slots, || 0),
        }
    }
}

impl ActionHelper<()> for CountHelper {
    type Result = u64;

    fn name(&self) -> &str {
        "Count"
    }

    fn exec<'a>(&self, slot: usize, _values: <() as ColumnTypes>::Refs<'a>) -> Result<()> {
        *self.counts.lock(slot)? += 1;
        Ok(())
    }

    fn finalize(&self) -> Result<u64> {
        let mut total = 0;
        self.counts.for_each(|_, count| total += *count);
        Ok(total)
    }

    fn supports_partial_update(&self) -> bool {
        true
    }

    fn partial_update(&self, slot: usize) -> Result<u64> {
        Ok(*self.counts.lock(slot)?)
    }
}
