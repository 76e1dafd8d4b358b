use crate::artifacts::Image;
use crate::error::CellError;
use crate::value::Value;
use smallvec::SmallVec;
use std::sync::Arc;

/// What one cell invocation left behind.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// One value per output, positionally.
    pub values: Arc<[Value]>,
    pub artifacts: Arc<[Image]>,
}

impl Outcome {
    pub fn new(values: Vec<Value>, artifacts: Vec<Image>) -> Self {
        Self {
            values: values.into(),
            artifacts: artifacts.into(),
        }
    }

    /// Every output holds the same failure value.
    pub fn failed(error: Arc<CellError>, arity: usize) -> Self {
        Self::new(vec![Value::Error(error); arity], Vec::new())
    }

    pub fn with_artifacts(mut self, artifacts: Vec<Image>) -> Self {
        self.artifacts = artifacts.into();
        self
    }
}

#[derive(Debug, Clone)]
struct Invocation {
    /// `None` when the outcome was recorded without running the body.
    arguments: Option<SmallVec<[Value; 4]>>,
    outcome: Outcome,
}

/// Result of a memoized call.
#[derive(Debug, Clone)]
pub struct Memoized {
    pub outcome: Outcome,
    pub invoked: bool,
    /// Output indices whose value differs from the previous outcome.
    pub changes: Vec<usize>,
}

/// Per-cell memory of the last invocation.
#[derive(Debug, Clone, Default)]
pub struct Memo {
    previous: Option<Invocation>,
    changed: bool,
}

impl Memo {
    /// Clear the per-pass changed flag.
    pub fn begin_pass(&mut self) {
        self.changed = false;
    }

    /// Whether the last call or record in this pass produced a new outcome.
    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn previous(&self) -> Option<&Outcome> {
        self.previous.as_ref().map(|invocation| &invocation.outcome)
    }

    /// Run `invoke` unless every argument matches the previous call.
    pub fn call(&mut self, arguments: &[Value], invoke: impl FnOnce() -> Outcome) -> Memoized {
        if let Some(previous) = &self.previous {
            let reusable = previous.arguments.as_ref().is_some_and(|previous_arguments| {
                previous_arguments.len() == arguments.len()
                    && previous_arguments
                        .iter()
                        .zip(arguments)
                        .all(|(previous, current)| previous.same_as(current))
            });
            if reusable {
                self.changed = false;
                return Memoized {
                    outcome: previous.outcome.clone(),
                    invoked: false,
                    changes: Vec::new(),
                };
            }
        }
        let outcome = invoke();
        let changes = self.store(Some(arguments.iter().cloned().collect()), outcome.clone());
        Memoized {
            outcome,
            invoked: true,
            changes,
        }
    }

    /// Replace the outcome without running the body.
    ///
    /// The next `call` always invokes, whatever its arguments.
    pub fn record(&mut self, outcome: Outcome) -> Vec<usize> {
        self.store(None, outcome)
    }

    fn store(&mut self, arguments: Option<SmallVec<[Value; 4]>>, outcome: Outcome) -> Vec<usize> {
        let changes = match &self.previous {
            None => (0..outcome.values.len()).collect(),
            Some(previous) => outcome
                .values
                .iter()
                .enumerate()
                .filter(|(index, value)| {
                    previous
                        .outcome
                        .values
                        .get(*index)
                        .is_none_or(|previous| !previous.same_as(value))
                })
                .map(|(index, _)| index)
                .collect(),
        };
        self.changed = true;
        self.previous = Some(Invocation { arguments, outcome });
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn outcome(values: Vec<Value>) -> Outcome {
        Outcome::new(values, Vec::new())
    }

    #[test]
    fn test_first_call_reports_every_output() {
        let mut memo = Memo::default();
        let result = memo.call(&[], || outcome(vec![Value::Number(1.), Value::Number(2.)]));
        assert!(result.invoked);
        assert_eq!(result.changes, [0, 1]);
        assert!(memo.changed());
    }

    #[test]
    fn test_equal_primitive_arguments_reuse() {
        let calls = Cell::new(0);
        let mut memo = Memo::default();
        let run = |memo: &mut Memo, argument: f64| {
            memo.call(&[Value::Number(argument), Value::text("a")], || {
                calls.set(calls.get() + 1);
                outcome(vec![Value::Number(argument * 2.)])
            })
        };
        run(&mut memo, 1.);
        memo.begin_pass();
        let reused = run(&mut memo, 1.);
        assert!(!reused.invoked);
        assert!(reused.changes.is_empty());
        assert!(!memo.changed());
        assert_eq!(calls.get(), 1);

        let invoked = run(&mut memo, 2.);
        assert!(invoked.invoked);
        assert_eq!(invoked.changes, [0]);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_lists_compare_by_identity() {
        let list = Value::numbers([1., 2.]);
        let mut memo = Memo::default();
        memo.call(std::slice::from_ref(&list), || outcome(vec![Value::None]));
        assert!(!memo.call(std::slice::from_ref(&list), || outcome(vec![Value::None])).invoked);
        let copy = Value::numbers([1., 2.]);
        assert!(memo.call(&[copy], || outcome(vec![Value::None])).invoked);
    }

    #[test]
    fn test_unchanged_outputs_are_not_reported() {
        let mut memo = Memo::default();
        memo.call(&[Value::Number(1.)], || outcome(vec![Value::Number(0.), Value::Number(1.)]));
        let result = memo.call(&[Value::Number(2.)], || {
            outcome(vec![Value::Number(0.), Value::Number(5.)])
        });
        assert_eq!(result.changes, [1]);
    }

    #[test]
    fn test_recorded_outcome_forces_next_call() {
        let error = Arc::new(CellError::CyclicDependency {
            cycle: vec!["a".into(), "a".into()],
        });
        let mut memo = Memo::default();
        memo.call(&[], || outcome(vec![Value::Number(1.)]));
        assert_eq!(memo.record(Outcome::failed(error.clone(), 1)), [0]);
        assert!(memo.record(Outcome::failed(error, 1)).is_empty());
        let result = memo.call(&[], || outcome(vec![Value::Number(1.)]));
        assert!(result.invoked);
        assert_eq!(result.changes, [0]);
    }
}
