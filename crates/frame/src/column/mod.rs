//! Typed column inputs.
//!
//! A node declares its inputs as a tuple type such as `(f64, Vec<i32>)`.
//! `ColumnTypes` turns that tuple into bindings at graph construction time and
//! into per-slot readers when a loop starts, so column types are checked once
//! and entries are read without any runtime type dispatch.

mod binding;
mod value;

pub use binding::{ColumnBinding, ColumnRegister, Resolver};
pub use value::{ColumnValue, DefineValue, SlotContext};

use quiver_core::{Error, FieldType, Result};

/// A type that can flow through the graph as a column value.
pub trait Column: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Column for T {}

/// Canonical name of a column type: `f64`, `Vec<i32>`, or the Rust type name
/// for types the storage engine does not know.
pub fn column_type_name<T: 'static>() -> String {
    FieldType::of::<T>()
        .map(|t| t.type_name())
        .unwrap_or_else(|| std::any::type_name::<T>().to_string())
}

/// A tuple of column types read together by one node.
pub trait ColumnTypes: Send + Sync + 'static {
    /// Borrowed values of one entry.
    type Refs<'a>;
    /// Resolved column bindings, fixed at construction.
    type Bindings: Send + Sync + 'static;
    /// Readers for one slot.
    type Readers: Send + 'static;

    const COUNT: usize;

    fn type_names() -> Vec<String>;

    fn bind(resolver: &Resolver<'_>, names: &[String]) -> Result<Self::Bindings>;

    fn readers(bindings: &Self::Bindings, ctx: &SlotContext<'_>) -> Result<Self::Readers>;

    fn read<'a>(readers: &'a mut Self::Readers, entry: u64) -> Result<Self::Refs<'a>>;
}

/// Checks that a node was given as many column names as it has inputs.
pub(crate) fn check_arity(names: &[String], expected: usize) -> Result<()> {
    if names.len() != expected {
        return Err(Error::invalid_operation(format!(
            "expected {} column names, got {} ({})",
            expected,
            names.len(),
            names.join(", ")
        )));
    }
    Ok(())
}

/// A callable over the values of one entry.
pub trait ColumnFn<Args: ColumnTypes, R>: Send + Sync + 'static {
    fn call<'a>(&self, values: Args::Refs<'a>) -> R;
}

/// A callable over the slot number and the values of one entry.
pub trait SlotFn<Args: ColumnTypes, R>: Send + Sync + 'static {
    fn call<'a>(&self, slot: usize, values: Args::Refs<'a>) -> R;
}

/// A callable over the slot number, the entry number and the values of one entry.
pub trait SlotEntryFn<Args: ColumnTypes, R>: Send + Sync + 'static {
    fn call<'a>(&self, slot: usize, entry: u64, values: Args::Refs<'a>) -> R;
}

macro_rules! impl_column_types {
    ($count:expr; $($t:ident $v:ident $idx:tt),*) => {
        impl<$($t: Column),*> ColumnTypes for ($($t,)*) {
            type Refs<'a> = ($(&'a $t,)*);
            type Bindings = ($(ColumnBinding<$t>,)*);
            type Readers = ($(ColumnValue<$t>,)*);

            const COUNT: usize = $count;

            fn type_names() -> Vec<String> {
                vec![$(column_type_name::<$t>()),*]
            }

            #[allow(unused_variables)]
            fn bind(resolver: &Resolver<'_>, names: &[String]) -> Result<Self::Bindings> {
                check_arity(names, $count)?;
                Ok(($(resolver.bind::<$t>(&names[$idx])?,)*))
            }

            #[allow(unused_variables)]
            fn readers(bindings: &Self::Bindings, ctx: &SlotContext<'_>) -> Result<Self::Readers> {
                Ok(($(bindings.$idx.reader(ctx)?,)*))
            }

            #[allow(unused_variables)]
            fn read<'a>(readers: &'a mut Self::Readers, entry: u64) -> Result<Self::Refs<'a>> {
                Ok(($(readers.$idx.get(entry)?,)*))
            }
        }

        impl<Func, Ret, $($t: Column),*> ColumnFn<($($t,)*), Ret> for Func
        where
            Func: Fn($(&$t),*) -> Ret + Send + Sync + 'static,
        {
            fn call<'a>(&self, values: <($($t,)*) as ColumnTypes>::Refs<'a>) -> Ret {
                let ($($v,)*) = values;
                self($($v),*)
            }
        }

        impl<Func, Ret, $($t: Column),*> SlotFn<($($t,)*), Ret> for Func
        where
            Func: Fn(usize, $(&$t),*) -> Ret + Send + Sync + 'static,
        {
            fn call<'a>(&self, slot: usize, values: <($($t,)*) as ColumnTypes>::Refs<'a>) -> Ret {
                let ($($v,)*) = values;
                self(slot, $($v),*)
            }
        }

        impl<Func, Ret, $($t: Column),*> SlotEntryFn<($($t,)*), Ret> for Func
        where
            Func: Fn(usize, u64, $(&$t),*) -> Ret + Send + Sync + 'static,
        {
            fn call<'a>(
                &self,
                slot: usize,
                entry: u64,
                values: <($($t,)*) as ColumnTypes>::Refs<'a>,
            ) -> Ret {
                let ($($v,)*) = values;
                self(slot, entry, $($v),*)
            }
        }
    };
}

impl_column_types!(0;);
impl_column_types!(1; A a 0);
impl_column_types!(2; A a 0, B b 1);
impl_column_types!(3; A a 0, B b 1, C c 2);
impl_column_types!(4; A a 0, B b 1, C c 2, D d 3);
impl_column_types!(5; A a 0, B b 1, C c 2, D d 3, E e 4);
impl_column_types!(6; A a 0, B b 1, C c 2, D d 3, E e 4, G g 5);

/// The expression of a define, with its extra-argument kind erased.
pub(crate) trait Expression<Args: ColumnTypes, R>: Send + Sync {
    fn eval<'a>(&self, slot: usize, entry: u64, values: Args::Refs<'a>) -> R;
}

/// Expression over column values only.
pub(crate) struct Plain<F>(pub F);

/// Expression receiving the slot first.
pub(crate) struct WithSlot<F>(pub F);

/// Expression receiving the slot and the entry first.
pub(crate) struct WithSlotEntry<F>(pub F);

impl<Args: ColumnTypes, R, F: ColumnFn<Args, R>> Expression<Args, R> for Plain<F> {
    fn eval<'a>(&self, _slot: usize, _entry: u64, values: Args::Refs<'a>) -> R {
        self.0.call(values)
    }
}

impl<Args: ColumnTypes, R, F: SlotFn<Args, R>> Expression<Args, R> for WithSlot<F> {
    fn eval<'a>(&self, slot: usize, _entry: u64, values: Args::Refs<'a>) -> R {
        self.0.call(slot, values)
    }
}

impl<Args: ColumnTypes, R, F: SlotEntryFn<Args, R>> Expression<Args, R> for WithSlotEntry<F> {
    fn eval<'a>(&self, slot: usize, entry: u64, values: Args::Refs<'a>) -> R {
        self.0.call(slot, entry, values)
    }
}
