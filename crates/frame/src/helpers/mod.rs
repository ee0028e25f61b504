//! Accumulators behind the built-in actions.

mod count;
mod fill;
mod foreach;
mod numeric;
mod reduce;
mod report;
mod take;

pub use count::CountHelper;
pub use fill::{FillHelper, Fillable};
pub use foreach::{ForeachHelper, ForeachSlotHelper};
pub use numeric::{MaxHelper, MeanHelper, MinHelper, NumericColumn, SumHelper};
pub use reduce::ReduceHelper;
pub use report::ReportHelper;
pub use take::{TakeHelper, TakeValuesHelper};
