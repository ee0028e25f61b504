use crate::column::{Column, ColumnTypes};
use crate::nodes::ActionHelper;
use crate::slot::SlotCells;
use quiver_core::{Result, Value};

/// Collects every value, slot by slot.
pub struct TakeHelper<T> {
    values: SlotCells<Vec<T>>,
}

impl<T> TakeHelper<T> {
    pub fn new(n_slots: usize) -> Self {
        Self {
            values: SlotCells::new(n_slots, Vec::new),
        }
    }
}

impl<T: Column> ActionHelper<(T,)> for TakeHelper<T> {
    type Result = Vec<T>;

    fn name(&self) -> &str {
        "Take"
    }

    fn exec<'a>(&self, slot: usize, values: <(T,) as ColumnTypes>::Refs<'a>) -> Result<()> {
        let (value,) = values;
        self.values.lock(slot)?.push(value.clone());
        Ok(())
    }

    fn finalize(&self) -> Result<Vec<T>> {
        let mut all = Vec::new();
        self.values.for_each(|_, values| all.append(values));
        Ok(all)
    }

    fn supports_partial_update(&self) -> bool {
        true
    }

    fn partial_update(&self, slot: usize) -> Result<Vec<T>> {
        Ok(self.values.lock(slot)?.clone())
    }
}

/// Collects every value as a runtime-typed [`Value`].
pub struct TakeValuesHelper<T> {
    inner: TakeHelper<Value>,
    _column: std::marker::PhantomData<fn() -> T>,
}

impl<T> TakeValuesHelper<T> {
    pub fn new(n_slots: usize) -> Self {
        Self {
            inner: TakeHelper::new(n_slots),
            _column: std::marker::PhantomData,
        }
    }
}

impl<T: Column> ActionHelper<(T,)> for TakeValuesHelper<T>
where
    Value: From<T>,
{
    type Result = Vec<Value>;

    fn name(&self) -> &str {
        "TakeValues"
    }

    fn exec<'a>(&self, slot: usize, values: <(T,) as ColumnTypes>::Refs<'a>) -> Result<()> {
        let (value,) = values;
        self.inner.values.lock(slot)?.push(Value::from(value.clone()));
        Ok(())
    }

    fn finalize(&self) -> Result<Vec<Value>> {
        <TakeHelper<Value> as ActionHelper<(Value,)>>::finalize(&self.inner)
    }

    fn supports_partial_update(&self) -> bool {
        true
    }

    fn partial_update(&self, slot: usize) -> Result<Vec<Value>> {
        <TakeHelper<Value> as ActionHelper<(Value,)>>::partial_update(&self.inner, slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_concatenates_slots() {
        let helper = TakeHelper::<u64>::new(2);
        helper.exec(1, (&10,)).unwrap();
        helper.exec(0, (&1,)).unwrap();
        helper.exec(1, (&11,)).unwrap();
        assert_eq!(helper.partial_update(1).unwrap(), vec![10, 11]);
        assert_eq!(helper.finalize().unwrap(), vec![1, 10, 11]);
    }

    #[test]
    fn test_take_values() {
        let helper = TakeValuesHelper::<Vec<i16>>::new(1);
        helper.exec(0, (&vec![1i16, 2],)).unwrap();
        assert_eq!(
            helper.finalize().unwrap(),
            vec![Value::List(vec![Value::Int16(1), Value::Int16(2)])]
        );
    }
}
