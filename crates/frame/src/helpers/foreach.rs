use crate::column::{ColumnFn, ColumnTypes, SlotFn};
use crate::nodes::ActionHelper;
use quiver_core::Result;
use std::marker::PhantomData;

/// Calls a function on every entry passing the upstream filters.
pub struct ForeachHelper<Args, F> {
    f: F,
    _args: PhantomData<fn() -> Args>,
}

impl<Args, F> ForeachHelper<Args, F> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _args: PhantomData,
        }
    }
}

impl<Args: ColumnTypes, F: ColumnFn<Args, ()>> ActionHelper<Args> for ForeachHelper<Args, F> {
    type Result = ();

    fn name(&self) -> &str {
        "Foreach"
    }

    fn exec<'a>(&self, _slot: usize, values: Args::Refs<'a>) -> Result<()> {
        self.f.call(values);
        Ok(())
    }

    fn finalize(&self) -> Result<()> {
        Ok(())
    }
}

/// Like [`ForeachHelper`], also passing the processing slot.
pub struct ForeachSlotHelper<Args, F> {
    f: F,
    _args: PhantomData<fn() -> Args>,
}

impl<Args, F> ForeachSlotHelper<Args, F> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _args: PhantomData,
        }
    }
}

impl<Args: ColumnTypes, F: SlotFn<Args, ()>> ActionHelper<Args> for ForeachSlotHelper<Args, F> {
    type Result = ();

    fn name(&self) -> &str {
        "ForeachSlot"
    }

    fn exec<'a>(&self, slot: usize, values: Args::Refs<'a>) -> Result<()> {
        self.f.call(slot, values);
        Ok(())
    }

    fn finalize(&self) -> Result<()> {
        Ok(())
    }
}
