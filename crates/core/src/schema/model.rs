//! Schema and schema builder.

use super::field::Field;
use crate::error::{Error, Result};
use crate::types::FieldType;

/// An ordered collection of top-level fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schema {
    name: String,
    description: String,
    fields: Vec<Field>,
}

impl Schema {
    /// Returns the nTuple name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the nTuple description.
    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns all fields in declaration order.
    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Gets a field by name.
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Gets the position of a field by name.
    pub fn get_field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name() == name)
    }

    /// Returns the number of fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the schema has no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Validates a name follows naming rules.
pub fn check_naming_rules(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return Err(Error::invalid_name("name cannot be empty")),
    };
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(Error::invalid_name(format!(
            "name must start with letter or underscore: {}",
            name
        )));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::invalid_name(format!(
            "name contains invalid characters: {}",
            name
        )));
    }
    Ok(())
}

/// Builder for creating schemas.
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    description: String,
    fields: Vec<Field>,
}

impl SchemaBuilder {
    /// Creates a new schema builder for an nTuple called `name`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        check_naming_rules(&name)?;
        Ok(Self {
            name,
            description: String::new(),
            fields: Vec::new(),
        })
    }

    /// Sets the nTuple description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds a field.
    pub fn add_field(self, name: impl Into<String>, field_type: FieldType) -> Result<Self> {
        self.push(Field::new(name, field_type))
    }

    /// Adds a fully described field.
    pub fn push(mut self, field: Field) -> Result<Self> {
        check_naming_rules(field.name())?;
        if self.fields.iter().any(|f| f.name() == field.name()) {
            return Err(Error::duplicate_column(field.name()));
        }
        self.fields.push(field);
        Ok(self)
    }

    /// Builds the schema.
    pub fn build(self) -> Result<Schema> {
        if self.fields.is_empty() {
            return Err(Error::invalid_operation(format!(
                "schema {} has no fields",
                self.name
            )));
        }
        let fields = self
            .fields
            .into_iter()
            .enumerate()
            .map(|(i, f)| f.with_index(i))
            .collect();
        Ok(Schema {
            name: self.name,
            description: self.description,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ElementType;

    #[test]
    fn test_schema_builder() {
        let schema = SchemaBuilder::new("events")
            .unwrap()
            .add_field("pt", FieldType::Scalar(ElementType::Real32))
            .unwrap()
            .add_field("hits", FieldType::Collection(ElementType::Int32))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(schema.name(), "events");
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.get_field_index("hits"), Some(1));
        assert_eq!(schema.get_field("hits").unwrap().index(), 1);
        assert!(schema.get_field("unknown").is_none());
    }

    #[test]
    fn test_invalid_field_name() {
        let result = SchemaBuilder::new("events")
            .unwrap()
            .add_field("1pt", FieldType::Scalar(ElementType::Real32));
        assert!(matches!(result, Err(Error::InvalidName { .. })));
        assert!(SchemaBuilder::new("").is_err());
    }

    #[test]
    fn test_duplicate_field() {
        let result = SchemaBuilder::new("events")
            .unwrap()
            .add_field("pt", FieldType::Scalar(ElementType::Real32))
            .unwrap()
            .add_field("pt", FieldType::Scalar(ElementType::Real64));
        assert!(matches!(result, Err(Error::DuplicateColumn { .. })));
    }

    #[test]
    fn test_empty_schema_rejected() {
        assert!(SchemaBuilder::new("events").unwrap().build().is_err());
    }
}
