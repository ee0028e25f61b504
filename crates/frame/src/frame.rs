//! The user-facing graph building interface.

use crate::column::{
    Column, ColumnFn, ColumnRegister, ColumnTypes, DefineValue, Expression, Plain, SlotEntryFn,
    SlotFn, WithSlot, WithSlotEntry,
};
use crate::config::ExecutionConfig;
use crate::dispatch::TypeRegistry;
use crate::graph;
use crate::helpers::{
    CountHelper, FillHelper, Fillable, ForeachHelper, ForeachSlotHelper, MaxHelper, MeanHelper,
    MinHelper, NumericColumn, ReduceHelper, ReportHelper, SumHelper, TakeHelper,
    TakeValuesHelper,
};
use crate::loop_manager::LoopManager;
use crate::node::{Node, NodeKind};
use crate::nodes::{Action, ActionBase, ActionHelper, Define, DefineBase, Filter, FilterBase, Range};
use crate::report::CutFlowReport;
use crate::result::ResultPtr;
use crate::source::DataSource;
use quiver_core::schema::check_naming_rules;
use quiver_core::{Error, Result, Value};
use quiver_storage::NTupleReader;
use std::ops::Deref;
use std::path::Path;
use std::sync::{Arc, Weak};

/// A lazy computation graph over a dataset.
///
/// Building the graph only books work. The event loop runs when the first
/// result of a booked action is requested, producing every result booked up
/// to that point in one pass over the data.
///
/// ```rust
/// use quiver_frame::{DataFrame, ExecutionConfig};
///
/// let df = DataFrame::empty(100, &ExecutionConfig::new());
/// let x = df.define_slot_entry("x", &[], |_slot: usize, entry: u64| entry as f64).unwrap();
/// let count = x.filter(&["x"], |x: &f64| *x >= 90.0).unwrap().count().unwrap();
/// let sum = x.sum::<f64>("x").unwrap();
///
/// assert_eq!(*count.get().unwrap(), 10);
/// assert_eq!(*sum.get().unwrap(), 4950.0);
/// assert_eq!(df.loop_manager().n_runs(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct DataFrame {
    root: FrameNode,
}

impl DataFrame {
    /// A graph over `n_entries` entries without any column.
    pub fn empty(n_entries: u64, config: &ExecutionConfig) -> Self {
        Self::with_manager(LoopManager::empty(n_entries, config))
    }

    /// A graph over the entries of an open nTuple.
    pub fn from_ntuple(reader: NTupleReader, config: &ExecutionConfig) -> Self {
        Self::with_manager(LoopManager::from_ntuple(reader, config))
    }

    /// A graph over the nTuple stored at `path`.
    pub fn open(path: impl AsRef<Path>, config: &ExecutionConfig) -> Result<Self> {
        let reader = NTupleReader::open(path)?;
        Ok(Self::from_ntuple(reader, config))
    }

    /// A graph over an external data source.
    pub fn from_source(source: Box<dyn DataSource>, config: &ExecutionConfig) -> Self {
        Self::with_manager(LoopManager::from_source(source, config))
    }

    fn with_manager(manager: Arc<LoopManager>) -> Self {
        let node: Arc<dyn Node> = Arc::clone(&manager) as Arc<dyn Node>;
        Self {
            root: FrameNode {
                manager,
                node,
                register: ColumnRegister::new(),
            },
        }
    }

    pub fn loop_manager(&self) -> &Arc<LoopManager> {
        &self.root.manager
    }

    pub fn root(&self) -> &FrameNode {
        &self.root
    }
}

impl Deref for DataFrame {
    type Target = FrameNode;

    fn deref(&self) -> &FrameNode {
        &self.root
    }
}

/// A position in the graph: the node new transformations and actions attach to,
/// and the columns visible from it.
#[derive(Clone)]
pub struct FrameNode {
    manager: Arc<LoopManager>,
    node: Arc<dyn Node>,
    register: ColumnRegister,
}

impl FrameNode {
    fn derive(&self, node: Arc<dyn Node>, register: ColumnRegister) -> FrameNode {
        FrameNode {
            manager: Arc::clone(&self.manager),
            node,
            register,
        }
    }

    fn column_list(columns: &[&str]) -> Vec<String> {
        columns.iter().map(|c| c.to_string()).collect()
    }

    fn bind<Args: ColumnTypes>(&self, columns: &[String]) -> Result<Args::Bindings> {
        self.manager
            .with_resolver(&self.register, |resolver| Args::bind(resolver, columns))
    }

    fn check_new_column(&self, name: &str) -> Result<()> {
        check_naming_rules(name)?;
        if self.has_column(name) {
            return Err(Error::duplicate_column(name));
        }
        Ok(())
    }

    fn define_with<Args: ColumnTypes, R: Column>(
        &self,
        name: &str,
        columns: &[&str],
        expression: Box<dyn Expression<Args, R>>,
    ) -> Result<FrameNode> {
        self.check_new_column(name)?;
        let columns = Self::column_list(columns);
        let bindings = self.bind::<Args>(&columns)?;
        let define = Arc::new(Define::new(
            name,
            Arc::clone(&self.manager),
            Arc::clone(&self.node),
            expression,
            columns,
            bindings,
        ));
        let weak: Weak<dyn DefineBase> = Arc::downgrade(&define) as Weak<dyn DefineBase>;
        self.manager.book_define(define.id(), weak);
        let value: Arc<dyn DefineValue<R>> = Arc::clone(&define) as Arc<dyn DefineValue<R>>;
        let register = self.register.with_define::<R>(name, value);
        Ok(self.derive(define as Arc<dyn Node>, register))
    }

    /// Defines column `name` computed from `columns`.
    pub fn define<Args, R, F>(&self, name: &str, columns: &[&str], f: F) -> Result<FrameNode>
    where
        Args: ColumnTypes,
        R: Column,
        F: ColumnFn<Args, R>,
    {
        self.define_with::<Args, R>(name, columns, Box::new(Plain(f)))
    }

    /// Like [`define`](Self::define), the function also receives the processing slot.
    pub fn define_slot<Args, R, F>(&self, name: &str, columns: &[&str], f: F) -> Result<FrameNode>
    where
        Args: ColumnTypes,
        R: Column,
        F: SlotFn<Args, R>,
    {
        self.define_with::<Args, R>(name, columns, Box::new(WithSlot(f)))
    }

    /// Like [`define`](Self::define), the function also receives the slot and the entry number.
    pub fn define_slot_entry<Args, R, F>(
        &self,
        name: &str,
        columns: &[&str],
        f: F,
    ) -> Result<FrameNode>
    where
        Args: ColumnTypes,
        R: Column,
        F: SlotEntryFn<Args, R>,
    {
        self.define_with::<Args, R>(name, columns, Box::new(WithSlotEntry(f)))
    }

    fn filter_with<Args, F>(&self, name: Option<String>, columns: &[&str], f: F) -> Result<FrameNode>
    where
        Args: ColumnTypes,
        F: ColumnFn<Args, bool>,
    {
        let columns = Self::column_list(columns);
        let bindings = self.bind::<Args>(&columns)?;
        let named = name.is_some();
        let filter = Arc::new(Filter::<Args, F>::new(
            name,
            Arc::clone(&self.manager),
            Arc::clone(&self.node),
            f,
            columns,
            bindings,
        ));
        let weak: Weak<dyn FilterBase> = Arc::downgrade(&filter) as Weak<dyn FilterBase>;
        self.manager.book_filter(filter.id(), named, weak);
        Ok(self.derive(filter as Arc<dyn Node>, self.register.clone()))
    }

    /// Keeps the entries for which `f` returns true.
    pub fn filter<Args, F>(&self, columns: &[&str], f: F) -> Result<FrameNode>
    where
        Args: ColumnTypes,
        F: ColumnFn<Args, bool>,
    {
        self.filter_with::<Args, F>(None, columns, f)
    }

    /// A filter whose pass and total counts appear in cut-flow reports.
    pub fn filter_named<Args, F>(&self, name: &str, columns: &[&str], f: F) -> Result<FrameNode>
    where
        Args: ColumnTypes,
        F: ColumnFn<Args, bool>,
    {
        if name.is_empty() {
            return Err(Error::invalid_name("filter name cannot be empty"));
        }
        self.filter_with::<Args, F>(Some(name.to_string()), columns, f)
    }

    /// Keeps the entries reaching this node at positions `start..stop`, every
    /// `stride`-th one; `stop == 0` means no upper bound.
    pub fn range(&self, start: u64, stop: u64, stride: u64) -> Result<FrameNode> {
        let range = Arc::new(Range::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.node),
            start,
            stop,
            stride,
        )?);
        let node: Arc<dyn Node> = range;
        self.manager.book_range(node.id(), Arc::downgrade(&node));
        Ok(self.derive(node, self.register.clone()))
    }

    /// Makes `column` also visible as `alias` downstream of this node.
    pub fn alias(&self, alias: &str, column: &str) -> Result<FrameNode> {
        self.check_new_column(alias)?;
        if !self.has_column(column) {
            return Err(Error::column_not_found(column));
        }
        let register = self.register.with_alias(alias, column);
        Ok(self.derive(Arc::clone(&self.node), register))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.manager
            .with_resolver(&self.register, |resolver| resolver.column_names())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.manager
            .with_resolver(&self.register, |resolver| resolver.has_column(name))
    }

    /// Canonical type name of a visible column.
    pub fn column_type_name(&self, name: &str) -> Result<String> {
        self.manager
            .with_resolver(&self.register, |resolver| resolver.type_name(name))
            .ok_or_else(|| Error::column_not_found(name))
    }

    /// Columns defined upstream of this node, in definition order.
    pub fn defined_columns(&self) -> Vec<String> {
        self.register.define_names().to_vec()
    }

    /// Names of the named filters upstream of this node; every named filter of
    /// the graph for the root.
    pub fn filter_names(&self) -> Vec<String> {
        if self.node.kind() == NodeKind::Root {
            return self
                .manager
                .named_filters()
                .iter()
                .filter_map(|f| f.name().map(str::to_string))
                .collect();
        }
        let mut names = Vec::new();
        self.node.add_filter_name(&mut names);
        names
    }

    pub fn n_slots(&self) -> usize {
        self.manager.n_slots()
    }

    pub fn node(&self) -> &Arc<dyn Node> {
        &self.node
    }

    /// Books an action driven by `helper` over `columns`.
    pub fn book<Args, H>(&self, columns: &[&str], helper: H) -> Result<ResultPtr<H::Result>>
    where
        Args: ColumnTypes,
        H: ActionHelper<Args>,
    {
        let columns = Self::column_list(columns);
        let bindings = self.bind::<Args>(&columns)?;
        let action = Arc::new(Action::<Args, H>::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.node),
            helper,
            columns,
            bindings,
        ));
        let value = action.result();
        let action: Arc<dyn ActionBase> = action;
        self.manager.book_action(action.id(), Arc::downgrade(&action));
        Ok(ResultPtr::new(value, action, Arc::clone(&self.manager)))
    }

    /// Number of entries passing the filters upstream of this node.
    pub fn count(&self) -> Result<ResultPtr<u64>> {
        self.book::<(), _>(&[], CountHelper::new(self.n_slots()))
    }

    pub fn sum<T: NumericColumn>(&self, column: &str) -> Result<ResultPtr<f64>> {
        self.book::<(T,), _>(&[column], SumHelper::<T>::new(self.n_slots()))
    }

    /// Mean of the values, NaN without any value.
    pub fn mean<T: NumericColumn>(&self, column: &str) -> Result<ResultPtr<f64>> {
        self.book::<(T,), _>(&[column], MeanHelper::<T>::new(self.n_slots()))
    }

    pub fn min<T: NumericColumn>(&self, column: &str) -> Result<ResultPtr<f64>> {
        self.book::<(T,), _>(&[column], MinHelper::<T>::new(self.n_slots()))
    }

    pub fn max<T: NumericColumn>(&self, column: &str) -> Result<ResultPtr<f64>> {
        self.book::<(T,), _>(&[column], MaxHelper::<T>::new(self.n_slots()))
    }

    /// Every value of the column. With several slots, values are grouped by slot.
    pub fn take<T: Column>(&self, column: &str) -> Result<ResultPtr<Vec<T>>> {
        self.book::<(T,), _>(&[column], TakeHelper::<T>::new(self.n_slots()))
    }

    /// Folds the column with `f`, starting from `init`.
    pub fn reduce<T, F>(&self, column: &str, f: F, init: T) -> Result<ResultPtr<T>>
    where
        T: Column,
        F: Fn(&T, &T) -> T + Send + Sync + 'static,
    {
        self.book::<(T,), _>(&[column], ReduceHelper::new(f, init, self.n_slots()))
    }

    /// Fills clones of `model` with the values of `columns` and merges them.
    pub fn fill<Args, O>(&self, columns: &[&str], model: O) -> Result<ResultPtr<O>>
    where
        Args: ColumnTypes,
        O: Fillable<Args>,
    {
        let helper = FillHelper::<Args, O>::new(model, self.n_slots());
        self.book::<Args, _>(columns, helper)
    }

    /// Runs the event loop immediately, calling `f` on every entry passing
    /// the upstream filters.
    pub fn foreach<Args, F>(&self, columns: &[&str], f: F) -> Result<()>
    where
        Args: ColumnTypes,
        F: ColumnFn<Args, ()>,
    {
        let done = self.book::<Args, _>(columns, ForeachHelper::<Args, F>::new(f))?;
        done.get().map(|_| ())
    }

    /// Like [`foreach`](Self::foreach), `f` also receives the processing slot.
    pub fn foreach_slot<Args, F>(&self, columns: &[&str], f: F) -> Result<()>
    where
        Args: ColumnTypes,
        F: SlotFn<Args, ()>,
    {
        let done = self.book::<Args, _>(columns, ForeachSlotHelper::<Args, F>::new(f))?;
        done.get().map(|_| ())
    }

    /// Cut-flow of the named filters upstream of this node, or of every named
    /// filter of the graph when called on the root.
    pub fn report(&self) -> Result<ResultPtr<CutFlowReport>> {
        self.book::<(), _>(&[], ReportHelper::new(Arc::clone(&self.node)))
    }

    /// Sum of a column whose type is looked up at runtime.
    pub fn sum_dyn(&self, column: &str) -> Result<ResultPtr<f64>> {
        TypeRegistry::global()
            .get(&self.column_type_name(column)?)?
            .sum(self, column)
    }

    pub fn mean_dyn(&self, column: &str) -> Result<ResultPtr<f64>> {
        TypeRegistry::global()
            .get(&self.column_type_name(column)?)?
            .mean(self, column)
    }

    pub fn min_dyn(&self, column: &str) -> Result<ResultPtr<f64>> {
        TypeRegistry::global()
            .get(&self.column_type_name(column)?)?
            .min(self, column)
    }

    pub fn max_dyn(&self, column: &str) -> Result<ResultPtr<f64>> {
        TypeRegistry::global()
            .get(&self.column_type_name(column)?)?
            .max(self, column)
    }

    /// Every value of a column as runtime-typed values.
    pub fn take_values(&self, column: &str) -> Result<ResultPtr<Vec<Value>>> {
        TypeRegistry::global()
            .get(&self.column_type_name(column)?)?
            .take_values(self, column)
    }

    pub(crate) fn take_values_of<T: Column>(&self, column: &str) -> Result<ResultPtr<Vec<Value>>>
    where
        Value: From<T>,
    {
        self.book::<(T,), _>(&[column], TakeValuesHelper::<T>::new(self.n_slots()))
    }

    /// Registers a callback for the next event loop, see
    /// [`LoopManager::register_callback`].
    pub fn register_callback(
        &self,
        every_n: u64,
        f: impl Fn(usize) -> Result<()> + Send + Sync + 'static,
    ) {
        self.manager.register_callback(every_n, f);
    }

    /// DOT description of the whole graph for the root, or of the chain
    /// leading to this node.
    pub fn graph_dot(&self) -> String {
        if self.node.kind() == NodeKind::Root {
            graph::render_graph(&self.manager)
        } else {
            graph::render_chain(&self.node)
        }
    }

    pub fn save_graph(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.graph_dot())?;
        Ok(())
    }
}

impl std::fmt::Debug for FrameNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameNode")
            .field("graph", &self.manager.graph_id())
            .field("node", &self.node.label())
            .field("columns", &self.register)
            .finish()
    }
}
