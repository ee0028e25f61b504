//! Column element packing.
//!
//! Mappable elements are stored exactly as they sit in a page. `Bit` elements
//! occupy one byte in memory and one bit on storage, least significant bit first.

use quiver_core::{Element, ElementType, Value};

/// Packs `n` in-memory elements from `src` into their on-disk form.
pub fn pack(element: ElementType, src: &[u8], n: usize, dst: &mut Vec<u8>) {
    dst.clear();
    if element.is_mappable() {
        dst.extend_from_slice(&src[..n * element.size()]);
        return;
    }
    dst.resize(element.packed_len(n), 0);
    for (i, &byte) in src[..n].iter().enumerate() {
        if byte != 0 {
            dst[i / 8] |= 1 << (i % 8);
        }
    }
}

/// Unpacks `n` on-disk elements from `src` into a fresh in-memory buffer.
pub fn unpack(element: ElementType, src: &[u8], n: usize) -> Vec<u8> {
    if element.is_mappable() {
        return src[..n * element.size()].to_vec();
    }
    (0..n).map(|i| (src[i / 8] >> (i % 8)) & 1).collect()
}

/// Encodes a scalar value into one element slot; false if the value has the wrong type.
pub fn write_value(element: ElementType, value: &Value, dst: &mut [u8]) -> bool {
    match (element, value) {
        (ElementType::Index, Value::UInt32(v)) => v.write_le(dst),
        (ElementType::Bit, Value::Bool(v)) => v.write_le(dst),
        (ElementType::Byte, Value::UInt8(v)) => v.write_le(dst),
        (ElementType::Int16, Value::Int16(v)) => v.write_le(dst),
        (ElementType::Int32, Value::Int32(v)) => v.write_le(dst),
        (ElementType::Int64, Value::Int64(v)) => v.write_le(dst),
        (ElementType::Real32, Value::Float32(v)) => v.write_le(dst),
        (ElementType::Real64, Value::Float64(v)) => v.write_le(dst),
        _ => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_packing() {
        let bits = [1u8, 0, 1, 1, 0, 0, 0, 0, 1, 1];
        let mut packed = Vec::new();
        pack(ElementType::Bit, &bits, bits.len(), &mut packed);
        assert_eq!(packed, vec![0b0000_1101, 0b0000_0011]);
        assert_eq!(unpack(ElementType::Bit, &packed, bits.len()), bits.to_vec());
    }

    #[test]
    fn test_mappable_is_identity() {
        let src: Vec<u8> = (0..16).collect();
        let mut packed = Vec::new();
        pack(ElementType::Int32, &src, 3, &mut packed);
        assert_eq!(packed, src[..12].to_vec());
        assert_eq!(unpack(ElementType::Int32, &packed, 3), packed);
    }

    #[test]
    fn test_write_value_type_check() {
        let mut slot = [0u8; 8];
        assert!(write_value(ElementType::Real64, &Value::Float64(3.0), &mut slot));
        assert_eq!(f64::read_le(&slot), 3.0);
        assert!(!write_value(ElementType::Real64, &Value::Float32(3.0), &mut slot));
    }
}
