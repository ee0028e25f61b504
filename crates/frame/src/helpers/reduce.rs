use crate::column::{Column, ColumnTypes};
use crate::nodes::ActionHelper;
use crate::slot::SlotCells;
use quiver_core::Result;

/// Folds all values with a binary function.
///
/// Each slot folds its own values; the final result folds `init` with the
/// slot results, so `f` must be associative and commutative.
pub struct ReduceHelper<T, F> {
    f: F,
    init: T,
    accumulators: SlotCells<Option<T>>,
}

impl<T, F> ReduceHelper<T, F> {
    pub fn new(f: F, init: T, n_slots: usize) -> Self {
        Self {
            f,
            init,
            accumulators: SlotCells::new(n_slots, || None),
        }
    }
}

impl<T, F> ActionHelper<(T,)> for ReduceHelper<T, F>
where
    T: Column,
    F: Fn(&T, &T) -> T + Send + Sync + 'static,
{
    type Result = T;

    fn name(&self) -> &str {
        "Reduce"
    }

    fn exec<'a>(&self, slot: usize, values: <(T,) as ColumnTypes>::Refs<'a>) -> Result<()> {
        let (value,) = values;
        let mut acc = self.accumulators.lock(slot)?;
        let next = match acc.as_ref() {
            Some(current) => (self.f)(current, value),
            None => value.clone(),
        };
        *acc = Some(next);
        Ok(())
    }

    fn finalize(&self) -> Result<T> {
        let mut result = self.init.clone();
        self.accumulators.for_each(|_, acc| {
            if let Some(acc) = acc.as_ref() {
                result = (self.f)(&result, acc);
            }
        });
        Ok(result)
    }

    fn supports_partial_update(&self) -> bool {
        true
    }

    fn partial_update(&self, slot: usize) -> Result<T> {
        let acc = self.accumulators.lock(slot)?;
        Ok(match acc.as_ref() {
            Some(acc) => (self.f)(&self.init, acc),
            None => self.init.clone(),
        })
    }
}
