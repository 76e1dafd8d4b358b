use crate::cell::{Cell, CellBody, compile_cell};
use crate::config::WorkspaceConfig;
use crate::evaluator::{ChangeObserver, EvaluationState, Evaluator, PassContext, PassReport};
use crate::graph::Graph;
use crate::memo::Memo;
use crate::value::Value;
use indexmap::IndexMap;

/// A set of cells together with everything remembered between passes.
///
/// Editing a cell recompiles that cell and patches only its own entries in
/// the graph, so registering cells one by one stays linear. Nothing runs
/// until a pass is requested.
#[derive(Debug, Default)]
pub struct Workspace {
    config: WorkspaceConfig,
    cells: IndexMap<String, Cell>,
    graph: Graph,
    state: EvaluationState,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: WorkspaceConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// Register or edit a cell. Returns `false` when source and outputs are
    /// unchanged, in which case the cell keeps its memo.
    pub fn set_cell(&mut self, name: &str, source: &str, outputs: &[String]) -> bool {
        self.install(name, source, outputs)
    }

    /// Register a host function as a cell, always replacing a previous one.
    pub fn set_native_cell(&mut self, cell: Cell) {
        log::debug!("registered native cell '{}'", cell.name);
        self.attach(cell);
    }

    pub fn remove_cell(&mut self, name: &str) -> Option<Cell> {
        let cell = self.cells.shift_remove(name)?;
        log::debug!("removed cell '{name}'");
        self.detach(&cell);
        self.state.retain_failures(&self.graph);
        Some(cell)
    }

    /// Make the script cells match `sources`: new ones are compiled, edited
    /// ones recompiled, missing ones removed. Native cells are left alone.
    pub fn update(&mut self, sources: &IndexMap<String, String>, outputs: &IndexMap<String, Vec<String>>) {
        let removed: Vec<String> = self
            .cells
            .iter()
            .filter(|(name, cell)| cell.source.is_some() && !sources.contains_key(*name))
            .map(|(name, _)| name.clone())
            .collect();
        for name in removed {
            self.remove_cell(&name);
        }
        for (name, source) in sources {
            let declared = outputs.get(name).map(Vec::as_slice).unwrap_or_default();
            self.install(name, source, declared);
        }
    }

    fn install(&mut self, name: &str, source: &str, outputs: &[String]) -> bool {
        if let Some(existing) = self.cells.get(name) {
            let same_source = existing.source.as_ref().is_some_and(|existing| existing.as_str() == source);
            if same_source && existing.declared_outputs == outputs {
                return false;
            }
            log::debug!("recompiling cell '{name}'");
        }
        self.attach(compile_cell(name, source, outputs));
        true
    }

    /// Add or replace a cell, keeping its registration position on replace.
    fn attach(&mut self, cell: Cell) {
        if let Some(previous) = self.cells.get(&cell.name) {
            let settled = self.graph.remove(previous);
            self.state.evict(previous);
            self.state.forget(&settled);
        }
        let contested = self.graph.insert(&cell);
        self.state.forget(&contested);
        self.cells.insert(cell.name.clone(), cell);
        self.state.retain_failures(&self.graph);
    }

    /// Unlink a cell that is no longer in `self.cells`.
    fn detach(&mut self, cell: &Cell) {
        let settled = self.graph.remove(cell);
        self.state.evict(cell);
        self.state.forget(&settled);
    }

    /// Resolve every cell once, in registration order.
    pub fn run_pass(&mut self, observer: Option<&mut dyn ChangeObserver>) -> PassReport {
        self.begin_pass();
        let mut pass = PassContext::new(observer);
        Evaluator::new(&self.cells, &self.graph, &self.config, &mut self.state, &mut pass).evaluate_all();
        pass.finish()
    }

    /// Resolve one variable and whatever it needs, nothing else.
    pub fn resolve(&mut self, name: &str, observer: Option<&mut dyn ChangeObserver>) -> (Value, PassReport) {
        self.begin_pass();
        let mut pass = PassContext::new(observer);
        let value = Evaluator::new(&self.cells, &self.graph, &self.config, &mut self.state, &mut pass).resolve(name);
        (value, pass.finish())
    }

    fn begin_pass(&mut self) {
        self.state.memos.values_mut().for_each(Memo::begin_pass);
    }

    /// Last value of a variable, without evaluating anything.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.state.cache.get(name)
    }

    pub fn cache(&self) -> &IndexMap<String, Value> {
        &self.state.cache
    }

    pub fn cell(&self, name: &str) -> Option<&Cell> {
        self.cells.get(name)
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Whether the memo of `cell` produced a new outcome in the last pass.
    pub fn changed(&self, cell: &str) -> bool {
        self.state.memos.get(cell).is_some_and(Memo::changed)
    }

    /// Cells that failed to compile, in registration order.
    pub fn compile_errors(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.cells
            .iter()
            .filter(|(_, cell)| matches!(cell.body, CellBody::Failed(_)))
            .map(|(name, cell)| (name.as_str(), cell))
    }
}
