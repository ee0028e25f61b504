//! Runtime-typed dispatch of the numeric actions.
//!
//! Actions are generic over their column types. When a column type is only
//! known at runtime, by its canonical name or `TypeId`, the registry maps it to
//! the typed instantiation that books the action.

use crate::column::column_type_name;
use crate::frame::FrameNode;
use crate::helpers::NumericColumn;
use crate::result::ResultPtr;
use hashbrown::HashMap;
use quiver_core::{Error, Result, Value};
use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

/// Numeric actions of one concrete column type.
pub trait TypedOps: Send + Sync {
    fn type_name(&self) -> String;

    fn sum(&self, node: &FrameNode, column: &str) -> Result<ResultPtr<f64>>;

    fn mean(&self, node: &FrameNode, column: &str) -> Result<ResultPtr<f64>>;

    fn min(&self, node: &FrameNode, column: &str) -> Result<ResultPtr<f64>>;

    fn max(&self, node: &FrameNode, column: &str) -> Result<ResultPtr<f64>>;

    fn take_values(&self, node: &FrameNode, column: &str) -> Result<ResultPtr<Vec<Value>>>;
}

struct Ops<T>(PhantomData<fn() -> T>);

impl<T> TypedOps for Ops<T>
where
    T: NumericColumn,
    Value: From<T>,
{
    fn type_name(&self) -> String {
        column_type_name::<T>()
    }

    fn sum(&self, node: &FrameNode, column: &str) -> Result<ResultPtr<f64>> {
        node.sum::<T>(column)
    }

    fn mean(&self, node: &FrameNode, column: &str) -> Result<ResultPtr<f64>> {
        node.mean::<T>(column)
    }

    fn min(&self, node: &FrameNode, column: &str) -> Result<ResultPtr<f64>> {
        node.min::<T>(column)
    }

    fn max(&self, node: &FrameNode, column: &str) -> Result<ResultPtr<f64>> {
        node.max::<T>(column)
    }

    fn take_values(&self, node: &FrameNode, column: &str) -> Result<ResultPtr<Vec<Value>>> {
        node.take_values_of::<T>(column)
    }
}

/// Typed operations keyed by canonical type name and by `TypeId`.
pub struct TypeRegistry {
    by_name: HashMap<String, Arc<dyn TypedOps>>,
    by_id: HashMap<TypeId, Arc<dyn TypedOps>>,
}

static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();

impl TypeRegistry {
    /// The registry of every storage element type and its collection.
    pub fn global() -> &'static TypeRegistry {
        REGISTRY.get_or_init(|| {
            let mut registry = TypeRegistry {
                by_name: HashMap::new(),
                by_id: HashMap::new(),
            };
            registry.register::<bool>();
            registry.register::<u8>();
            registry.register::<i16>();
            registry.register::<i32>();
            registry.register::<i64>();
            registry.register::<u32>();
            registry.register::<f32>();
            registry.register::<f64>();
            registry.register::<Vec<bool>>();
            registry.register::<Vec<u8>>();
            registry.register::<Vec<i16>>();
            registry.register::<Vec<i32>>();
            registry.register::<Vec<i64>>();
            registry.register::<Vec<u32>>();
            registry.register::<Vec<f32>>();
            registry.register::<Vec<f64>>();
            registry
        })
    }

    fn register<T>(&mut self)
    where
        T: NumericColumn,
        Value: From<T>,
    {
        let ops: Arc<dyn TypedOps> = Arc::new(Ops::<T>(PhantomData));
        self.by_name.insert(ops.type_name(), Arc::clone(&ops));
        self.by_id.insert(TypeId::of::<T>(), ops);
    }

    pub fn get(&self, type_name: &str) -> Result<&dyn TypedOps> {
        self.by_name
            .get(type_name)
            .map(|ops| ops.as_ref())
            .ok_or_else(|| {
                Error::unsupported(format!("no runtime dispatch for column type {}", type_name))
            })
    }

    pub fn get_by_id(&self, id: TypeId) -> Option<&dyn TypedOps> {
        self.by_id.get(&id).map(|ops| ops.as_ref())
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_field_types() {
        let registry = TypeRegistry::global();
        assert_eq!(registry.type_names().len(), 16);
        assert_eq!(registry.get("f64").unwrap().type_name(), "f64");
        assert_eq!(registry.get("Vec<i32>").unwrap().type_name(), "Vec<i32>");
        assert_eq!(
            registry.get_by_id(TypeId::of::<Vec<f32>>()).unwrap().type_name(),
            "Vec<f32>"
        );
        assert!(registry.get("String").is_err());
        assert!(registry.get_by_id(TypeId::of::<String>()).is_none());
    }
}
