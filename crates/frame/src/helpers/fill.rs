use crate::column::ColumnTypes;
use crate::nodes::ActionHelper;
use crate::slot::SlotCells;
use quiver_core::Result;
use std::marker::PhantomData;

/// An object that accumulates column values and can be merged.
///
/// Every slot fills its own clone of the model object; the clones are merged
/// into one at the end of the loop.
pub trait Fillable<Args: ColumnTypes>: Clone + Send + Sync + 'static {
    fn fill<'a>(&mut self, values: Args::Refs<'a>);

    fn merge(&mut self, other: &Self);
}

pub struct FillHelper<Args, O> {
    model: O,
    objects: SlotCells<O>,
    _args: PhantomData<fn() -> Args>,
}

impl<Args, O: Clone> FillHelper<Args, O> {
    pub fn new(model: O, n_slots: usize) -> Self {
        let objects = SlotCells::new(n_slots, || model.clone());
        Self {
            model,
            objects,
            _args: PhantomData,
        }
    }
}

impl<Args: ColumnTypes, O: Fillable<Args>> ActionHelper<Args> for FillHelper<Args, O> {
    type Result = O;

    fn name(&self) -> &str {
        "Fill"
    }

    fn init_slot(&self, slot: usize) -> Result<()> {
        *self.objects.lock(slot)? = self.model.clone();
        Ok(())
    }

    fn exec<'a>(&self, slot: usize, values: Args::Refs<'a>) -> Result<()> {
        Fillable::<Args>::fill(&mut *self.objects.lock(slot)?, values);
        Ok(())
    }

    fn finalize(&self) -> Result<O> {
        let mut merged: Option<O> = None;
        self.objects.for_each(|_, object| match merged.as_mut() {
            Some(acc) => acc.merge(object),
            None => merged = Some(object.clone()),
        });
        Ok(merged.unwrap_or_else(|| self.model.clone()))
    }

    fn supports_partial_update(&self) -> bool {
        true
    }

    fn partial_update(&self, slot: usize) -> Result<O> {
        Ok(self.objects.lock(slot)?.clone())
    }
}
