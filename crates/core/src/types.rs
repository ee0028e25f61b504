//! Element and field type definitions.
//!
//! An `ElementType` is the unit stored in one column of the paged storage engine.
//! A `FieldType` is what a user-visible field holds: a single element or a
//! variable-length collection of elements (stored as an offset column plus a
//! data column).

use crate::error::{Error, Result};
use crate::value::Value;
use core::any::TypeId;
use core::fmt;

/// Storage element types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Cluster-relative collection offset (`u32`)
    Index,
    /// Boolean, packed to one bit on storage
    Bit,
    /// Unsigned byte
    Byte,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 32-bit floating point
    Real32,
    /// 64-bit floating point
    Real64,
}

impl ElementType {
    /// All element types, in on-disk tag order.
    pub const ALL: [ElementType; 8] = [
        ElementType::Index,
        ElementType::Bit,
        ElementType::Byte,
        ElementType::Int16,
        ElementType::Int32,
        ElementType::Int64,
        ElementType::Real32,
        ElementType::Real64,
    ];

    /// Size of one element in memory, in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        match self {
            ElementType::Bit | ElementType::Byte => 1,
            ElementType::Int16 => 2,
            ElementType::Index | ElementType::Int32 | ElementType::Real32 => 4,
            ElementType::Int64 | ElementType::Real64 => 8,
        }
    }

    /// Number of bits one element occupies on storage.
    #[inline]
    pub fn bits_on_storage(&self) -> usize {
        match self {
            ElementType::Bit => 1,
            other => other.size() * 8,
        }
    }

    /// Whether the in-memory layout equals the on-disk layout.
    #[inline]
    pub fn is_mappable(&self) -> bool {
        self.bits_on_storage() == self.size() * 8
    }

    /// Number of bytes `n` elements occupy on storage.
    #[inline]
    pub fn packed_len(&self, n: usize) -> usize {
        (n * self.bits_on_storage() + 7) / 8
    }

    /// Name of the Rust type that holds one element.
    pub fn rust_name(&self) -> &'static str {
        match self {
            ElementType::Index => "u32",
            ElementType::Bit => "bool",
            ElementType::Byte => "u8",
            ElementType::Int16 => "i16",
            ElementType::Int32 => "i32",
            ElementType::Int64 => "i64",
            ElementType::Real32 => "f32",
            ElementType::Real64 => "f64",
        }
    }

    /// Parses a Rust type name back into an element type.
    pub fn from_rust_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.rust_name() == name)
    }

    /// Stable tag written to the header.
    #[inline]
    pub fn tag(&self) -> u8 {
        match self {
            ElementType::Index => 1,
            ElementType::Bit => 2,
            ElementType::Byte => 3,
            ElementType::Int16 => 4,
            ElementType::Int32 => 5,
            ElementType::Int64 => 6,
            ElementType::Real32 => 7,
            ElementType::Real64 => 8,
        }
    }

    /// Decodes a header tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.tag() == tag)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rust_name())
    }
}

/// A Rust primitive that can be stored as a column element.
pub trait Element: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// The storage element type.
    const TYPE: ElementType;

    /// Decodes one element from its little-endian in-memory page representation.
    fn read_le(src: &[u8]) -> Self;

    /// Encodes one element into its little-endian in-memory page representation.
    fn write_le(self, dst: &mut [u8]);

    /// Converts to a runtime value.
    fn into_value(self) -> Value;

    /// Extracts from a runtime value of exactly this type.
    fn from_value(value: &Value) -> Option<Self>;

    /// Widens to `f64` for numeric aggregation.
    fn to_f64(self) -> f64;
}

macro_rules! impl_numeric_element {
    ($ty:ty, $elem:ident, $variant:ident) => {
        impl Element for $ty {
            const TYPE: ElementType = ElementType::$elem;

            #[inline]
            fn read_le(src: &[u8]) -> Self {
                let mut buf = [0u8; core::mem::size_of::<$ty>()];
                buf.copy_from_slice(&src[..core::mem::size_of::<$ty>()]);
                <$ty>::from_le_bytes(buf)
            }

            #[inline]
            fn write_le(self, dst: &mut [u8]) {
                dst[..core::mem::size_of::<$ty>()].copy_from_slice(&self.to_le_bytes());
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(*v),
                    _ => None,
                }
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_numeric_element!(u32, Index, UInt32);
impl_numeric_element!(u8, Byte, UInt8);
impl_numeric_element!(i16, Int16, Int16);
impl_numeric_element!(i32, Int32, Int32);
impl_numeric_element!(i64, Int64, Int64);
impl_numeric_element!(f32, Real32, Float32);
impl_numeric_element!(f64, Real64, Float64);

impl Element for bool {
    const TYPE: ElementType = ElementType::Bit;

    #[inline]
    fn read_le(src: &[u8]) -> Self {
        src[0] != 0
    }

    #[inline]
    fn write_le(self, dst: &mut [u8]) {
        dst[0] = self as u8;
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    fn to_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }
}

/// The type of a user-visible field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// One element per entry.
    Scalar(ElementType),
    /// A variable number of elements per entry.
    Collection(ElementType),
}

impl FieldType {
    /// Returns the element type of the field's data column.
    #[inline]
    pub fn element_type(&self) -> ElementType {
        match self {
            FieldType::Scalar(t) | FieldType::Collection(t) => *t,
        }
    }

    /// Returns whether the field holds a collection per entry.
    #[inline]
    pub fn is_collection(&self) -> bool {
        matches!(self, FieldType::Collection(_))
    }

    /// Canonical type name: `f64` for scalars, `Vec<f64>` for collections.
    pub fn type_name(&self) -> String {
        match self {
            FieldType::Scalar(t) => t.rust_name().to_string(),
            FieldType::Collection(t) => format!("Vec<{}>", t.rust_name()),
        }
    }

    /// Parses a canonical type name.
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        if let Some(inner) = name.strip_prefix("Vec<").and_then(|s| s.strip_suffix('>')) {
            return ElementType::from_rust_name(inner.trim())
                .map(FieldType::Collection)
                .ok_or_else(|| Error::invalid_operation(format!("unsupported field type: {}", name)));
        }
        ElementType::from_rust_name(name)
            .map(FieldType::Scalar)
            .ok_or_else(|| Error::invalid_operation(format!("unsupported field type: {}", name)))
    }

    /// `TypeId` of the Rust type a reader hands out for this field.
    pub fn type_id(&self) -> TypeId {
        match self {
            FieldType::Scalar(t) => scalar_type_id(*t),
            FieldType::Collection(t) => collection_type_id(*t),
        }
    }

    /// Returns the field type whose values are represented by `T`, if any.
    pub fn of<T: 'static>() -> Option<Self> {
        let id = TypeId::of::<T>();
        ElementType::ALL.iter().find_map(|&t| {
            if scalar_type_id(t) == id {
                Some(FieldType::Scalar(t))
            } else if collection_type_id(t) == id {
                Some(FieldType::Collection(t))
            } else {
                None
            }
        })
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name())
    }
}

fn scalar_type_id(t: ElementType) -> TypeId {
    match t {
        ElementType::Index => TypeId::of::<u32>(),
        ElementType::Bit => TypeId::of::<bool>(),
        ElementType::Byte => TypeId::of::<u8>(),
        ElementType::Int16 => TypeId::of::<i16>(),
        ElementType::Int32 => TypeId::of::<i32>(),
        ElementType::Int64 => TypeId::of::<i64>(),
        ElementType::Real32 => TypeId::of::<f32>(),
        ElementType::Real64 => TypeId::of::<f64>(),
    }
}

fn collection_type_id(t: ElementType) -> TypeId {
    match t {
        ElementType::Index => TypeId::of::<Vec<u32>>(),
        ElementType::Bit => TypeId::of::<Vec<bool>>(),
        ElementType::Byte => TypeId::of::<Vec<u8>>(),
        ElementType::Int16 => TypeId::of::<Vec<i16>>(),
        ElementType::Int32 => TypeId::of::<Vec<i32>>(),
        ElementType::Int64 => TypeId::of::<Vec<i64>>(),
        ElementType::Real32 => TypeId::of::<Vec<f32>>(),
        ElementType::Real64 => TypeId::of::<Vec<f64>>(),
    }
}
