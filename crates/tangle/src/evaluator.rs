use crate::artifacts::Image;
use crate::capture::capture;
use crate::cell::Cell;
use crate::config::WorkspaceConfig;
use crate::error::CellError;
use crate::graph::{Graph, Producer};
use crate::memo::{Memo, Outcome};
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;
use std::sync::Arc;

/// Receives `(cell, output_index)` for every output whose value changed.
pub trait ChangeObserver {
    fn output_changed(&mut self, cell: &str, index: usize);
}

impl<F: FnMut(&str, usize)> ChangeObserver for F {
    fn output_changed(&mut self, cell: &str, index: usize) {
        self(cell, index)
    }
}

/// What happened during one evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// Cells whose body actually ran, in completion order.
    pub invoked: Vec<String>,
    /// Cells answered from their memo.
    pub reused: Vec<String>,
    pub changes: Vec<(String, usize)>,
    /// Images of every cell resolved in this pass, reused cells included.
    pub artifacts: IndexMap<String, Arc<[Image]>>,
}

/// State that lives for exactly one pass.
pub struct PassContext<'o> {
    observer: Option<&'o mut dyn ChangeObserver>,
    completed: HashSet<String>,
    report: PassReport,
}

impl<'o> PassContext<'o> {
    pub fn new(observer: Option<&'o mut dyn ChangeObserver>) -> Self {
        Self {
            observer,
            completed: HashSet::new(),
            report: PassReport::default(),
        }
    }

    pub fn is_completed(&self, cell: &str) -> bool {
        self.completed.contains(cell)
    }

    pub fn finish(self) -> PassReport {
        self.report
    }

    fn changed(&mut self, cell: &str, changes: Vec<usize>) {
        for index in changes {
            if let Some(observer) = self.observer.as_deref_mut() {
                observer.output_changed(cell, index);
            }
            self.report.changes.push((cell.to_owned(), index));
        }
    }
}

/// Everything evaluation keeps between passes.
#[derive(Debug, Clone, Default)]
pub struct EvaluationState {
    pub cache: IndexMap<String, Value>,
    pub memos: IndexMap<String, Memo>,
    /// Failures made up by the evaluator rather than by a cell body, kept so
    /// the same failure keeps its identity from pass to pass.
    failures: Vec<Arc<CellError>>,
}

impl EvaluationState {
    /// Forget the memo and the cached values of a replaced or removed cell.
    pub fn evict(&mut self, cell: &Cell) {
        self.memos.shift_remove(&cell.name);
        self.cache.shift_remove(&cell.name);
        for output in &cell.outputs {
            self.cache.shift_remove(output);
        }
    }

    /// Drop cached values of names whose producer changed.
    pub fn forget(&mut self, names: &[String]) {
        for name in names {
            self.cache.shift_remove(name);
        }
    }

    /// Drop evaluator-made failures the graph no longer explains.
    pub fn retain_failures(&mut self, graph: &Graph) {
        self.failures.retain(|failure| match &**failure {
            CellError::UnknownReference { name, .. } => graph.producer(name).is_none(),
            CellError::DuplicateProducer { name, cells } => {
                matches!(graph.producer(name), Some(Producer::Conflict(current)) if current == cells)
            }
            CellError::CyclicDependency { cycle } => cycle.iter().all(|cell| graph.producer(cell).is_some()),
            CellError::Compile { .. } | CellError::Runtime { .. } => false,
        });
    }

    fn failure(&mut self, error: CellError) -> Value {
        if let Some(existing) = self.failures.iter().find(|existing| ***existing == error) {
            return Value::Error(existing.clone());
        }
        let error = Arc::new(error);
        self.failures.push(error.clone());
        Value::Error(error)
    }
}

enum Task<'a> {
    /// Make sure the producers of every input are done, then invoke.
    Visit(&'a str),
    Invoke(&'a str),
}

/// Pull-based evaluation of a compiled cell set.
///
/// Dependencies are followed with an explicit task stack. `in_progress` is
/// the current path from the requested cell down, so a cell found on it
/// again closes a cycle.
pub struct Evaluator<'a, 'o> {
    cells: &'a IndexMap<String, Cell>,
    graph: &'a Graph,
    config: &'a WorkspaceConfig,
    state: &'a mut EvaluationState,
    pass: &'a mut PassContext<'o>,
}

impl<'a, 'o> Evaluator<'a, 'o> {
    pub fn new(
        cells: &'a IndexMap<String, Cell>,
        graph: &'a Graph,
        config: &'a WorkspaceConfig,
        state: &'a mut EvaluationState,
        pass: &'a mut PassContext<'o>,
    ) -> Self {
        Self {
            cells,
            graph,
            config,
            state,
            pass,
        }
    }

    /// Resolve every cell in registration order.
    pub fn evaluate_all(&mut self) {
        let cells = self.cells;
        for name in cells.keys() {
            self.run_cell(name);
        }
    }

    /// Current value of a variable, running whatever it depends on.
    pub fn resolve(&mut self, name: &str) -> Value {
        let graph = self.graph;
        match graph.producer(name) {
            None => self.state.failure(CellError::UnknownReference {
                name: name.to_owned(),
                requested_by: None,
            }),
            Some(Producer::Conflict(cells)) => self.conflict(name, cells),
            Some(Producer::Cell(cell)) => {
                self.run_cell(cell);
                self.state.cache.get(name).cloned().unwrap_or(Value::None)
            }
        }
    }

    fn conflict(&mut self, name: &str, cells: &[String]) -> Value {
        let value = self.state.failure(CellError::DuplicateProducer {
            name: name.to_owned(),
            cells: cells.to_vec(),
        });
        self.state.cache.insert(name.to_owned(), value.clone());
        value
    }

    fn run_cell(&mut self, root: &'a str) {
        if self.pass.is_completed(root) {
            return;
        }
        let (cells, graph) = (self.cells, self.graph);
        let mut tasks = vec![Task::Visit(root)];
        let mut in_progress: IndexSet<&'a str> = IndexSet::new();
        while let Some(task) = tasks.pop() {
            match task {
                Task::Visit(name) => {
                    if self.pass.is_completed(name) {
                        continue;
                    }
                    if let Some(start) = in_progress.get_index_of(name) {
                        let mut cycle: Vec<&str> = in_progress.iter().skip(start).copied().collect();
                        cycle.push(name);
                        self.fail_cycle(&cycle);
                        continue;
                    }
                    let Some(cell) = cells.get(name) else {
                        continue;
                    };
                    in_progress.insert(name);
                    tasks.push(Task::Invoke(name));
                    for input in cell.inputs.iter().rev() {
                        if let Some(Producer::Cell(producer)) = graph.producer(input) {
                            tasks.push(Task::Visit(producer));
                        }
                    }
                }
                Task::Invoke(name) => {
                    in_progress.pop();
                    if !self.pass.is_completed(name) {
                        self.invoke(name);
                    }
                }
            }
        }
    }

    fn argument(&mut self, consumer: &str, input: &str) -> Value {
        let graph = self.graph;
        match graph.producer(input) {
            Some(Producer::Cell(_)) => {
                if let Some(value) = self.state.cache.get(input) {
                    return value.clone();
                }
                self.state.failure(CellError::UnknownReference {
                    name: input.to_owned(),
                    requested_by: Some(consumer.to_owned()),
                })
            }
            Some(Producer::Conflict(cells)) => self.conflict(input, cells),
            None => self.state.failure(CellError::UnknownReference {
                name: input.to_owned(),
                requested_by: Some(consumer.to_owned()),
            }),
        }
    }

    fn invoke(&mut self, name: &'a str) {
        let cells = self.cells;
        let Some(cell) = cells.get(name) else {
            return;
        };
        let arguments: Vec<Value> = cell
            .inputs
            .iter()
            .map(|input| self.argument(name, input))
            .collect();
        let config = self.config;
        let memoized = self
            .state
            .memos
            .entry(name.to_owned())
            .or_default()
            .call(&arguments, || capture(cell, &arguments, config));
        if memoized.invoked {
            log::debug!("invoked cell '{name}'");
            self.pass.report.invoked.push(name.to_owned());
        } else {
            log::trace!("reused cell '{name}'");
            self.pass.report.reused.push(name.to_owned());
        }
        self.complete(cell, &memoized.outcome, memoized.changes);
    }

    fn fail_cycle(&mut self, cycle: &[&str]) {
        log::debug!("cyclic dependency: {}", cycle.join(" -> "));
        let error = self.state.failure(CellError::CyclicDependency {
            cycle: cycle.iter().map(|cell| cell.to_string()).collect(),
        });
        let Value::Error(error) = error else {
            return;
        };
        let cells = self.cells;
        // The first name is repeated at the end.
        for name in &cycle[..cycle.len() - 1] {
            let Some(cell) = cells.get(*name) else {
                continue;
            };
            let outcome = Outcome::failed(error.clone(), cell.outputs.len());
            let changes = self
                .state
                .memos
                .entry(cell.name.clone())
                .or_default()
                .record(outcome.clone());
            self.complete(cell, &outcome, changes);
        }
    }

    /// Publish an outcome: cache, artifacts and change events.
    fn complete(&mut self, cell: &Cell, outcome: &Outcome, changes: Vec<usize>) {
        for (output, value) in cell.outputs.iter().zip(outcome.values.iter()) {
            self.state.cache.insert(output.clone(), value.clone());
        }
        let self_mapped = matches!(self.graph.producer(&cell.name), Some(Producer::Cell(producer)) if *producer == cell.name);
        if self_mapped && !cell.outputs.contains(&cell.name) {
            // Keep the list identity while its items are the same.
            let unchanged = self.state.cache.get(&cell.name).and_then(Value::as_list).is_some_and(|items| {
                items.len() == outcome.values.len()
                    && items.iter().zip(outcome.values.iter()).all(|(a, b)| a.same_as(b))
            });
            if !unchanged {
                self.state
                    .cache
                    .insert(cell.name.clone(), Value::list(outcome.values.iter().cloned()));
            }
        }
        if !outcome.artifacts.is_empty() {
            self.pass
                .report
                .artifacts
                .insert(cell.name.clone(), outcome.artifacts.clone());
        }
        self.pass.changed(&cell.name, changes);
        self.pass.completed.insert(cell.name.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::compile_cell;

    fn cell(name: &str, source: &str, outputs: &[&str]) -> Cell {
        let outputs: Vec<String> = outputs.iter().map(|o| o.to_string()).collect();
        compile_cell(name, source, &outputs)
    }

    fn world(cells: Vec<Cell>) -> (IndexMap<String, Cell>, Graph) {
        let cells: IndexMap<String, Cell> = cells.into_iter().map(|cell| (cell.name.clone(), cell)).collect();
        let graph = Graph::build(cells.values());
        (cells, graph)
    }

    fn failure(value: Option<&Value>) -> Arc<CellError> {
        match value {
            Some(Value::Error(error)) => error.clone(),
            other => panic!("Expected a failure, got {other:?}"),
        }
    }

    #[test]
    fn test_resolving_twice_in_one_pass_reuses_the_value() {
        let (cells, graph) = world(vec![
            cell("data", "xs = List/range(3)", &["xs"]),
            cell("total", "List/sum(xs)", &[]),
        ]);
        let config = WorkspaceConfig::default();
        let mut state = EvaluationState::default();
        let mut pass = PassContext::new(None);
        let mut evaluator = Evaluator::new(&cells, &graph, &config, &mut state, &mut pass);
        let first = evaluator.resolve("xs");
        let second = evaluator.resolve("xs");
        let total = evaluator.resolve("total");
        let again = evaluator.resolve("total");
        let report = pass.finish();

        let (Value::List(first), Value::List(second)) = (&first, &second) else {
            panic!("Expected lists, got {first:?} and {second:?}");
        };
        assert!(Arc::ptr_eq(first, second));
        assert_eq!(total.as_number(), Some(3.));
        assert_eq!(again.as_number(), Some(3.));
        assert_eq!(report.invoked, ["data", "total"]);
        assert!(report.reused.is_empty());
    }

    #[test]
    fn test_unknown_name_is_not_cached() {
        let (cells, graph) = world(vec![cell("a", "n = 1", &["n"])]);
        let config = WorkspaceConfig::default();
        let mut state = EvaluationState::default();
        let mut pass = PassContext::new(None);
        let first = Evaluator::new(&cells, &graph, &config, &mut state, &mut pass).resolve("ghost");
        let second = Evaluator::new(&cells, &graph, &config, &mut state, &mut pass).resolve("ghost");
        assert!(Arc::ptr_eq(&failure(Some(&first)), &failure(Some(&second))));
        assert!(!state.cache.contains_key("ghost"));
        assert!(pass.finish().invoked.is_empty());
    }

    #[test]
    fn test_cycle_path_ignores_finished_side_branch() {
        let (cells, graph) = world(vec![
            cell("a", "side + b", &[]),
            cell("b", "a * 2", &[]),
            cell("source", "side = 3", &["side"]),
            cell("d", "a + side", &[]),
        ]);
        let config = WorkspaceConfig::default();
        let mut state = EvaluationState::default();
        let mut pass = PassContext::new(None);
        Evaluator::new(&cells, &graph, &config, &mut state, &mut pass).evaluate_all();
        let report = pass.finish();

        // `source` runs and leaves the path before `b` walks back into `a`.
        assert_eq!(report.invoked, ["source", "d"]);
        let cycle = failure(state.cache.get("a"));
        assert_eq!(
            *cycle,
            CellError::CyclicDependency {
                cycle: vec!["a".into(), "b".into(), "a".into()],
            }
        );
        assert!(Arc::ptr_eq(&cycle, &failure(state.cache.get("b"))));
        assert!(Arc::ptr_eq(&cycle, &failure(state.cache.get("d"))));
        assert_eq!(state.cache.get("side").and_then(Value::as_number), Some(3.));

        state.memos.values_mut().for_each(Memo::begin_pass);
        let mut pass = PassContext::new(None);
        Evaluator::new(&cells, &graph, &config, &mut state, &mut pass).evaluate_all();
        let report = pass.finish();
        assert!(report.invoked.is_empty());
        assert_eq!(report.reused, ["source", "d"]);
        assert!(report.changes.is_empty());
    }
}
