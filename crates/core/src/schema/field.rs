//! Field definition.

use crate::types::FieldType;

/// A named, typed top-level field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    /// Field name.
    name: String,
    /// Value type of the field.
    field_type: FieldType,
    /// Free-form description kept in the header.
    description: String,
    /// Position in the schema (0-based).
    index: usize,
}

impl Field {
    /// Creates a new field definition.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            description: String::new(),
            index: 0,
        }
    }

    /// Sets the field description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub(crate) fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Returns the field name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field type.
    #[inline]
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Returns the field description.
    #[inline]
    pub fn get_description(&self) -> &str {
        &self.description
    }

    /// Returns the position of the field in its schema.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of storage columns backing this field.
    #[inline]
    pub fn column_count(&self) -> usize {
        if self.field_type.is_collection() {
            2
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ElementType;

    #[test]
    fn test_field_builder() {
        let field = Field::new("pt", FieldType::Scalar(ElementType::Real32)).description("transverse momentum");
        assert_eq!(field.name(), "pt");
        assert_eq!(field.get_description(), "transverse momentum");
        assert_eq!(field.column_count(), 1);
    }

    #[test]
    fn test_collection_columns() {
        let field = Field::new("hits", FieldType::Collection(ElementType::Int32));
        assert_eq!(field.column_count(), 2);
    }
}
