//! Quiver Frame - a lazy, typed computation graph over columnar datasets.
//!
//! A `DataFrame` is the root of a graph of transformations (defined columns,
//! filters, ranges) ending in actions. Booking an action returns a
//! `ResultPtr`; the first time any result is read, one event loop walks the
//! dataset and fills every booked action. With several slots the loop runs on
//! a dedicated thread pool, every node keeping its per-entry state per slot.
//!
//! - `DataFrame` / `FrameNode`: the graph building interface
//! - `LoopManager`: root node and event loop driver
//! - `nodes`: `Define`, `Filter`, `Range` and `Action` nodes
//! - `helpers`: accumulators behind the built-in actions
//! - `DataSource`: pluggable external sources of entries
//! - `CutFlowReport`: pass/total counts of named filters
//! - `TypeRegistry`: actions on columns whose type is only known at runtime
//!
//! # Example
//!
//! ```rust
//! use quiver_frame::{DataFrame, ExecutionConfig};
//!
//! let df = DataFrame::empty(128, &ExecutionConfig::new());
//! let e = df
//!     .define_slot_entry("e", &[], |_slot: usize, entry: u64| entry as i64)
//!     .unwrap();
//! let even = e.filter_named("even", &["e"], |e: &i64| e % 2 == 0).unwrap();
//! let large = even.filter_named("large", &["e"], |e: &i64| *e >= 100).unwrap();
//!
//! let n = large.count().unwrap();
//! let report = large.report().unwrap();
//! assert_eq!(*n.get().unwrap(), 14);
//!
//! let report = report.get().unwrap();
//! assert_eq!(report.at("even").unwrap().pass(), 64);
//! assert_eq!(report.at("large").unwrap().all(), 64);
//! ```

pub mod column;
pub mod config;
pub mod dispatch;
pub mod frame;
mod graph;
pub mod helpers;
pub mod loop_manager;
pub mod node;
pub mod nodes;
pub mod report;
pub mod result;
pub mod slot;
pub mod source;

pub use column::{Column, ColumnFn, ColumnTypes, SlotEntryFn, SlotFn};
pub use config::ExecutionConfig;
pub use dispatch::{TypeRegistry, TypedOps};
pub use frame::{DataFrame, FrameNode};
pub use helpers::{Fillable, NumericColumn};
pub use loop_manager::{LoopManager, LoopType};
pub use node::{Node, NodeId, NodeKind};
pub use nodes::ActionHelper;
pub use report::{CutFlowReport, CutInfo};
pub use result::ResultPtr;
pub use source::{DataSource, TrivialSource, VecSource};
