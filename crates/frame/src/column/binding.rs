//! Column name resolution.

use super::value::{ColumnValue, DefineValue, SlotContext};
use super::{column_type_name, Column};
use crate::source::DataSource;
use hashbrown::HashMap;
use quiver_core::{Error, FieldType, Result};
use quiver_storage::{NTupleReader, ValueReader};
use std::any::{Any, TypeId};
use std::sync::Arc;

/// Where a bound column reads its values from.
pub enum ColumnBinding<T: Column> {
    Dataset { name: String },
    Define {
        name: String,
        value: Arc<dyn DefineValue<T>>,
    },
    Source { name: String },
}

impl<T: Column> ColumnBinding<T> {
    pub fn name(&self) -> &str {
        match self {
            ColumnBinding::Dataset { name }
            | ColumnBinding::Define { name, .. }
            | ColumnBinding::Source { name } => name,
        }
    }

    /// Builds the reader of this column for one slot.
    pub fn reader(&self, ctx: &SlotContext<'_>) -> Result<ColumnValue<T>> {
        match self {
            ColumnBinding::Dataset { name } => {
                let dataset = ctx.dataset.ok_or_else(|| {
                    Error::invalid_operation(format!("column {} needs an nTuple to read from", name))
                })?;
                Ok(ColumnValue::Dataset(dataset.typed_reader::<T>(name)?))
            }
            ColumnBinding::Define { value, .. } => Ok(ColumnValue::Define {
                value: Arc::clone(value),
                slot: ctx.slot,
                cached: None,
            }),
            ColumnBinding::Source { name } => {
                let source = ctx.source.ok_or_else(|| {
                    Error::invalid_operation(format!("column {} needs a data source to read from", name))
                })?;
                let erased = source.column_reader(name, ctx.slot)?;
                let reader = erased.downcast::<Box<dyn ValueReader<T>>>().map_err(|_| {
                    Error::type_mismatch(
                        name.as_str(),
                        column_type_name::<T>(),
                        source.type_name(name).unwrap_or_default(),
                    )
                })?;
                Ok(ColumnValue::Source(*reader))
            }
        }
    }
}

impl<T: Column> std::fmt::Debug for ColumnBinding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ColumnBinding::Dataset { .. } => "Dataset",
            ColumnBinding::Define { .. } => "Define",
            ColumnBinding::Source { .. } => "Source",
        };
        f.debug_struct(kind).field("name", &self.name()).finish()
    }
}

#[derive(Clone)]
struct DefineEntry {
    type_name: String,
    type_id: TypeId,
    // Holds an `Arc<dyn DefineValue<T>>`.
    value: Arc<dyn Any + Send + Sync>,
}

/// The defines and aliases visible from one point of the graph.
///
/// Registers are immutable and shared: adding a define produces a new register
/// for the new branch, leaving sibling branches unaffected.
#[derive(Clone, Default)]
pub struct ColumnRegister {
    defines: Arc<HashMap<String, DefineEntry>>,
    order: Arc<Vec<String>>,
    aliases: Arc<HashMap<String, String>>,
}

impl ColumnRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// A register with `name` additionally bound to a define's value.
    pub fn with_define<T: Column>(&self, name: &str, value: Arc<dyn DefineValue<T>>) -> Self {
        let mut defines = (*self.defines).clone();
        defines.insert(
            name.to_string(),
            DefineEntry {
                type_name: column_type_name::<T>(),
                type_id: TypeId::of::<T>(),
                value: Arc::new(value),
            },
        );
        let mut order = (*self.order).clone();
        order.push(name.to_string());
        Self {
            defines: Arc::new(defines),
            order: Arc::new(order),
            aliases: Arc::clone(&self.aliases),
        }
    }

    /// A register with `alias` standing for `column`.
    pub fn with_alias(&self, alias: &str, column: &str) -> Self {
        let mut aliases = (*self.aliases).clone();
        aliases.insert(alias.to_string(), column.to_string());
        Self {
            defines: Arc::clone(&self.defines),
            order: Arc::clone(&self.order),
            aliases: Arc::new(aliases),
        }
    }

    pub fn is_define(&self, name: &str) -> bool {
        self.defines.contains_key(name)
    }

    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    /// Defined column names in definition order.
    pub fn define_names(&self) -> &[String] {
        &self.order
    }

    pub fn alias_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.aliases.keys().cloned().collect();
        names.sort();
        names
    }

    /// Follows an alias, if `name` is one.
    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn define_type_name(&self, name: &str) -> Option<&str> {
        self.defines.get(name).map(|e| e.type_name.as_str())
    }

    fn define_value<T: Column>(&self, name: &str) -> Option<Result<Arc<dyn DefineValue<T>>>> {
        let entry = self.defines.get(name)?;
        if entry.type_id != TypeId::of::<T>() {
            return Some(Err(Error::type_mismatch(
                name,
                column_type_name::<T>(),
                entry.type_name.as_str(),
            )));
        }
        Some(
            entry
                .value
                .downcast_ref::<Arc<dyn DefineValue<T>>>()
                .cloned()
                .ok_or_else(|| {
                    Error::type_mismatch(name, column_type_name::<T>(), entry.type_name.as_str())
                }),
        )
    }
}

impl std::fmt::Debug for ColumnRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnRegister")
            .field("defines", &self.order)
            .field("aliases", &self.alias_names())
            .finish()
    }
}

/// Resolves column names against defines, the nTuple and the data source, in that order.
pub struct Resolver<'a> {
    register: &'a ColumnRegister,
    dataset: Option<&'a NTupleReader>,
    source: Option<&'a dyn DataSource>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        register: &'a ColumnRegister,
        dataset: Option<&'a NTupleReader>,
        source: Option<&'a dyn DataSource>,
    ) -> Self {
        Self {
            register,
            dataset,
            source,
        }
    }

    /// Binds `name` as a column of type `T`.
    pub fn bind<T: Column>(&self, name: &str) -> Result<ColumnBinding<T>> {
        let name = self.register.resolve_alias(name);
        if let Some(value) = self.register.define_value::<T>(name) {
            return Ok(ColumnBinding::Define {
                name: name.to_string(),
                value: value?,
            });
        }
        if let Some(field_type) = self.dataset.and_then(|d| d.field_type(name)) {
            if FieldType::of::<T>() != Some(field_type) {
                return Err(Error::type_mismatch(
                    name,
                    column_type_name::<T>(),
                    field_type.type_name(),
                ));
            }
            return Ok(ColumnBinding::Dataset {
                name: name.to_string(),
            });
        }
        if let Some(source) = self.source.filter(|s| s.has_column(name)) {
            if source.column_type_id(name) != Some(TypeId::of::<T>()) {
                return Err(Error::type_mismatch(
                    name,
                    column_type_name::<T>(),
                    source.type_name(name).unwrap_or_default(),
                ));
            }
            return Ok(ColumnBinding::Source {
                name: name.to_string(),
            });
        }
        Err(Error::column_not_found(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.type_name(name).is_some()
    }

    /// Canonical type name of a column, following aliases.
    pub fn type_name(&self, name: &str) -> Option<String> {
        let name = self.register.resolve_alias(name);
        if let Some(t) = self.register.define_type_name(name) {
            return Some(t.to_string());
        }
        if let Some(t) = self.dataset.and_then(|d| d.field_type(name)) {
            return Some(t.type_name());
        }
        self.source.and_then(|s| s.type_name(name))
    }

    /// Every visible column: defines, then nTuple fields, then source columns, then aliases.
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.register.define_names().to_vec();
        let mut push = |name: String| {
            if !names.contains(&name) {
                names.push(name);
            }
        };
        if let Some(dataset) = self.dataset {
            dataset.field_names().into_iter().for_each(&mut push);
        }
        if let Some(source) = self.source {
            source.column_names().into_iter().for_each(&mut push);
        }
        self.register.alias_names().into_iter().for_each(&mut push);
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(f64);

    impl DefineValue<f64> for Constant {
        fn value(&self, _slot: usize, _entry: u64) -> Result<f64> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_register_is_copy_on_write() {
        let base = ColumnRegister::new();
        let branch = base.with_define::<f64>("x", Arc::new(Constant(1.5)));
        assert!(!base.is_define("x"));
        assert!(branch.is_define("x"));
        assert_eq!(branch.define_type_name("x"), Some("f64"));

        let aliased = branch.with_alias("y", "x");
        assert_eq!(aliased.resolve_alias("y"), "x");
        assert_eq!(aliased.resolve_alias("z"), "z");
        assert!(!branch.is_alias("y"));
    }

    #[test]
    fn test_bind_define() {
        let register = ColumnRegister::new()
            .with_define::<f64>("x", Arc::new(Constant(2.0)))
            .with_alias("alias_x", "x");
        let resolver = Resolver::new(&register, None, None);

        let binding = resolver.bind::<f64>("alias_x").unwrap();
        assert_eq!(binding.name(), "x");
        let mut reader = binding.reader(&SlotContext::new(0)).unwrap();
        assert_eq!(*reader.get(3).unwrap(), 2.0);

        let err = resolver.bind::<f32>("x").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert!(matches!(
            resolver.bind::<f64>("nope").unwrap_err(),
            Error::ColumnNotFound { .. }
        ));
        assert_eq!(resolver.column_names(), vec!["x", "alias_x"]);
    }
}
