//! Quiver Core - element types, values, schema and errors for quiver.
//!
//! This crate provides the foundational types shared by the storage engine and the
//! computation graph:
//!
//! - `ElementType`: column element types (Index, Bit, Byte, Int16/32/64, Real32/64)
//! - `Element`: the Rust primitives backing each element type
//! - `FieldType`: scalar or collection field types with canonical type names
//! - `Value`: runtime-typed field values
//! - `schema`: field and schema definitions
//! - `Error`: error type for every quiver operation
//!
//! # Example
//!
//! ```rust
//! use quiver_core::{ElementType, FieldType, Value};
//! use quiver_core::schema::SchemaBuilder;
//!
//! let schema = SchemaBuilder::new("events")
//!     .unwrap()
//!     .add_field("pt", FieldType::Scalar(ElementType::Real32))
//!     .unwrap()
//!     .add_field("hits", FieldType::Collection(ElementType::Int32))
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(schema.get_field("hits").unwrap().field_type().type_name(), "Vec<i32>");
//! assert!(Value::from(vec![1i32, 2, 3]).fits(schema.fields()[1].field_type()));
//! ```

mod error;
pub mod schema;
mod types;
mod value;

pub use error::{Error, Result};
pub use types::{Element, ElementType, FieldType};
pub use value::Value;
