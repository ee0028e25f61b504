//! Numeric reductions widened to `f64`.

use crate::column::{Column, ColumnTypes};
use crate::nodes::ActionHelper;
use crate::slot::SlotCells;
use quiver_core::Result;
use std::marker::PhantomData;

/// A column whose values can be folded into `f64` reductions.
///
/// Collections contribute each of their elements.
pub trait NumericColumn: Column {
    fn visit(&self, f: &mut dyn FnMut(f64));
}

macro_rules! impl_numeric_column {
    ($($t:ty),*) => {
        $(
            impl NumericColumn for $t {
                #[inline]
                fn visit(&self, f: &mut dyn FnMut(f64)) {
                    f(*self as f64)
                }
            }

            impl NumericColumn for Vec<$t> {
                fn visit(&self, f: &mut dyn FnMut(f64)) {
                    for v in self {
                        f(*v as f64);
                    }
                }
            }
        )*
    };
}

impl_numeric_column!(u8, i8, i16, u16, i32, u32, i64, u64, usize, f32, f64);

impl NumericColumn for bool {
    fn visit(&self, f: &mut dyn FnMut(f64)) {
        f(if *self { 1.0 } else { 0.0 })
    }
}

impl NumericColumn for Vec<bool> {
    fn visit(&self, f: &mut dyn FnMut(f64)) {
        for v in self {
            f(if *v { 1.0 } else { 0.0 });
        }
    }
}

/// Sum of all values.
pub struct SumHelper<T> {
    sums: SlotCells<f64>,
    _column: PhantomData<fn() -> T>,
}

impl<T> SumHelper<T> {
    pub fn new(n_slots: usize) -> Self {
        Self {
            sums: SlotCells::new(n_slots, || 0.0),
            _column: PhantomData,
        }
    }
}

impl<T: NumericColumn> ActionHelper<(T,)> for SumHelper<T> {
    type Result = f64;

    fn name(&self) -> &str {
        "Sum"
    }

    fn exec<'a>(&self, slot: usize, values: <(T,) as ColumnTypes>::Refs<'a>) -> Result<()> {
        let (value,) = values;
        let mut sum = self.sums.lock(slot)?;
        value.visit(&mut |v| *sum += v);
        Ok(())
    }

    fn finalize(&self) -> Result<f64> {
        let mut total = 0.0;
        self.sums.for_each(|_, sum| total += *sum);
        Ok(total)
    }

    fn supports_partial_update(&self) -> bool {
        true
    }

    fn partial_update(&self, slot: usize) -> Result<f64> {
        Ok(*self.sums.lock(slot)?)
    }
}

/// Arithmetic mean of all values; `NaN` without values.
pub struct MeanHelper<T> {
    sums: SlotCells<(f64, u64)>,
    _column: PhantomData<fn() -> T>,
}

impl<T> MeanHelper<T> {
    pub fn new(n_slots: usize) -> Self {
        Self {
            sums: SlotCells::new(n_slots, || (0.0, 0)),
            _column: PhantomData,
        }
    }
}

impl<T: NumericColumn> ActionHelper<(T,)> for MeanHelper<T> {
    type Result = f64;

    fn name(&self) -> &str {
        "Mean"
    }

    fn exec<'a>(&self, slot: usize, values: <(T,) as ColumnTypes>::Refs<'a>) -> Result<()> {
        let (value,) = values;
        let mut state = self.sums.lock(slot)?;
        value.visit(&mut |v| {
            state.0 += v;
            state.1 += 1;
        });
        Ok(())
    }

    fn finalize(&self) -> Result<f64> {
        let mut sum = 0.0;
        let mut n = 0u64;
        self.sums.for_each(|_, state| {
            sum += state.0;
            n += state.1;
        });
        Ok(sum / n as f64)
    }

    fn supports_partial_update(&self) -> bool {
        true
    }

    fn partial_update(&self, slot: usize) -> Result<f64> {
        let state = self.sums.lock(slot)?;
        Ok(state.0 / state.1 as f64)
    }
}

/// Smallest value; `+inf` without values.
pub struct MinHelper<T> {
    mins: SlotCells<f64>,
    _column: PhantomData<fn() -> T>,
}

impl<T> MinHelper<T> {
    pub fn new(n_slots: usize) -> Self {
        Self {
            mins: SlotCells::new(n_slots, || f64::INFINITY),
            _column: PhantomData,
        }
    }
}

impl<T: NumericColumn> ActionHelper<(T,)> for MinHelper<T> {
    type Result = f64;

    fn name(&self) -> &str {
        "Min"
    }

    fn exec<'a>(&self, slot: usize, values: <(T,) as ColumnTypes>::Refs<'a>) -> Result<()> {
        let (value,) = values;
        let mut min = self.mins.lock(slot)?;
        value.visit(&mut |v| *min = min.min(v));
        Ok(())
    }

    fn finalize(&self) -> Result<f64> {
        let mut result = f64::INFINITY;
        self.mins.for_each(|_, min| result = result.min(*min));
        Ok(result)
    }

    fn supports_partial_update(&self) -> bool {
        true
    }

    fn partial_update(&self, slot: usize) -> Result<f64> {
        Ok(*self.mins.lock(slot)?)
    }
}

/// Largest value; `-inf` without values.
pub struct MaxHelper<T> {
    maxs: SlotCells<f64>,
    _column: PhantomData<fn() -> T>,
}

impl<T> MaxHelper<T> {
    pub fn new(n_slots: usize) -> Self {
        Self {
            maxs: SlotCells::new(n_slots, || f64::NEG_INFINITY),
            _column: PhantomData,
        }
    }
}

impl<T: NumericColumn> ActionHelper<(T,)> for MaxHelper<T> {
    type Result = f64;

    fn name(&self) -> &str {
        "Max"
    }

    fn exec<'a>(&self, slot: usize, values: <(T,) as ColumnTypes>::Refs<'a>) -> Result<()> {
        let (value,) = values;
        let mut max = self.maxs.lock(slot)?;
        value.visit(&mut |v| *max = max.max(v));
        Ok(())
    }

    fn finalize(&self) -> Result<f64> {
        let mut result = f64::NEG_INFINITY;
        self.maxs.for_each(|_, max| result = result.max(*max));
        Ok(result)
    }

    fn supports_partial_update(&self) -> bool {
        true
    }

    fn partial_update(&self, slot: usize) -> Result<f64> {
        Ok(*self.maxs.lock(slot)?)
    }
}
