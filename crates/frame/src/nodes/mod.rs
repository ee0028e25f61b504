//! Graph node implementations.
//!
//! - `Define`: computed columns, cached per slot and entry
//! - `Filter`: predicates, optionally named for cut-flow reports
//! - `Range`: positional windows with early stop
//! - `Action`: leaves driving an `ActionHelper` accumulator

mod action;
mod define;
mod filter;
mod range;

pub use action::{Action, ActionBase, ActionHelper};
pub use define::{Define, DefineBase};
pub use filter::{Filter, FilterBase};
pub use range::Range;
