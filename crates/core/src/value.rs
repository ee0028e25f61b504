//! Runtime-typed values.
//!
//! `Value` carries one field's content for an entry when the concrete Rust type is
//! only known at runtime: rows handed to `NTupleWriter::fill` and results of
//! runtime-typed actions.

use crate::types::{Element, ElementType, FieldType};
use core::fmt;

/// A runtime-typed field value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Boolean value
    Bool(bool),
    /// Unsigned byte
    UInt8(u8),
    /// 16-bit signed integer
    Int16(i16),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 32-bit unsigned integer
    UInt32(u32),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
    /// Variable-length collection of scalar values
    List(Vec<Value>),
}

impl Value {
    /// Returns the element type of a scalar value, or None for lists.
    pub fn element_type(&self) -> Option<ElementType> {
        match self {
            Value::Bool(_) => Some(ElementType::Bit),
            Value::UInt8(_) => Some(ElementType::Byte),
            Value::Int16(_) => Some(ElementType::Int16),
            Value::Int32(_) => Some(ElementType::Int32),
            Value::Int64(_) => Some(ElementType::Int64),
            Value::UInt32(_) => Some(ElementType::Index),
            Value::Float32(_) => Some(ElementType::Real32),
            Value::Float64(_) => Some(ElementType::Real64),
            Value::List(_) => None,
        }
    }

    /// Returns whether this value can be stored in a field of type `ty`.
    pub fn fits(&self, ty: FieldType) -> bool {
        match (self, ty) {
            (Value::List(items), FieldType::Collection(elem)) => {
                items.iter().all(|v| v.element_type() == Some(elem))
            }
            (scalar, FieldType::Scalar(elem)) => scalar.element_type() == Some(elem),
            _ => false,
        }
    }

    /// Returns the numeric content widened to f64, or None for lists.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(v) => Some(v.to_f64()),
            Value::UInt8(v) => Some(*v as f64),
            Value::Int16(v) => Some(*v as f64),
            Value::Int32(v) => Some(*v as f64),
            Value::Int64(v) => Some(*v as f64),
            Value::UInt32(v) => Some(*v as f64),
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::List(_) => None,
        }
    }

    /// Returns the list items, if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Extracts a scalar of type `T`.
    #[inline]
    pub fn get<T: Element>(&self) -> Option<T> {
        T::from_value(self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::UInt8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

macro_rules! impl_from_element {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    v.into_value()
                }
            }

            impl From<Vec<$ty>> for Value {
                fn from(v: Vec<$ty>) -> Self {
                    Value::List(v.into_iter().map(Element::into_value).collect())
                }
            }
        )*
    };
}

impl_from_element!(bool, u8, i16, i32, i64, u32, f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_element_type() {
        assert_eq!(Value::Float64(1.0).element_type(), Some(ElementType::Real64));
        assert_eq!(Value::UInt32(3).element_type(), Some(ElementType::Index));
        assert_eq!(Value::List(vec![]).element_type(), None);
    }

    #[test]
    fn test_value_fits() {
        let v = Value::from(vec![1.0f32, 2.0]);
        assert!(v.fits(FieldType::Collection(ElementType::Real32)));
        assert!(!v.fits(FieldType::Collection(ElementType::Real64)));
        assert!(!v.fits(FieldType::Scalar(ElementType::Real32)));
        assert!(Value::List(vec![]).fits(FieldType::Collection(ElementType::Bit)));
        assert!(Value::Int16(7).fits(FieldType::Scalar(ElementType::Int16)));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(5i64).get::<i64>(), Some(5));
        assert_eq!(Value::from(5i64).get::<i32>(), None);
        assert_eq!(Value::Bool(true).as_f64(), Some(1.0));
        assert_eq!(Value::from(vec![1u8, 2]).to_string(), "[1, 2]");
    }
}
