//! Schema module.
//!
//! A `Schema` is the ordered list of top-level fields of an nTuple; it is what the
//! storage header serializes and what a writer validates rows against.

mod field;
mod model;

pub use field::Field;
pub use model::{check_naming_rules, Schema, SchemaBuilder};
