//! Failures are values: they are cached, flow to dependents and never abort a pass.

use std::sync::Arc;
use tangle::{Cell, CellError, FailureKind, Fault, Value, Workspace};

fn outputs(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn failure(workspace: &Workspace, name: &str) -> Arc<CellError> {
    match workspace.value(name) {
        Some(Value::Error(error)) => error.clone(),
        other => panic!("expected '{name}' to hold a failure, got {other:?}"),
    }
}

#[test]
fn compile_error_is_isolated_and_lazy() {
    let mut workspace = Workspace::new();
    workspace.set_cell("base", "n = 1", &outputs(&["n"]));
    workspace.set_cell("broken", "y = (", &outputs(&["y"]));
    workspace.set_cell("uses_y", "y + 1", &[]);
    workspace.set_cell("uses_n", "n + 1", &[]);
    assert!(workspace.cache().is_empty());

    workspace.run_pass(None);
    assert_eq!(workspace.value("uses_n").and_then(Value::as_number), Some(2.));
    let y = failure(&workspace, "y");
    assert_eq!(y.kind(), FailureKind::Compile);
    assert!(Arc::ptr_eq(&y, &failure(&workspace, "uses_y")));
}

#[test]
fn runtime_error_flows_until_handled() {
    let mut workspace = Workspace::new();
    workspace.set_cell("risky", "x = Error/raise('sensor offline')", &outputs(&["x"]));
    workspace.set_cell("passthrough", "x", &[]);
    workspace.set_cell("doubled", "x * 2", &[]);
    workspace.set_cell("handled", "Error/or(x, 0)", &[]);
    workspace.set_cell("flag", "Error/is(x)", &[]);
    workspace.run_pass(None);

    let x = failure(&workspace, "x");
    assert!(matches!(&*x, CellError::Runtime { cell, message, .. } if cell == "risky" && message == "sensor offline"));
    assert!(Arc::ptr_eq(&x, &failure(&workspace, "passthrough")));
    assert!(Arc::ptr_eq(&x, &failure(&workspace, "doubled")));
    assert_eq!(workspace.value("handled").and_then(Value::as_number), Some(0.));
    assert!(matches!(workspace.value("flag"), Some(Value::Bool(true))));
}

#[test]
fn failing_cell_fills_every_output() {
    let mut workspace = Workspace::new();
    workspace.set_cell("pair", "a = 1\nb = [1, 2][7]", &outputs(&["a", "b"]));
    workspace.run_pass(None);
    assert!(Arc::ptr_eq(&failure(&workspace, "a"), &failure(&workspace, "b")));
}

#[test]
fn cycle_is_reported_without_running_the_bodies() {
    let mut workspace = Workspace::new();
    workspace.set_cell("a", "b + 1", &[]);
    workspace.set_cell("b", "a + 1", &[]);
    workspace.set_cell("c", "a * 2", &[]);

    let report = workspace.run_pass(None);
    assert_eq!(report.invoked, ["c"]);
    let a = failure(&workspace, "a");
    assert_eq!(
        *a,
        CellError::CyclicDependency {
            cycle: outputs(&["a", "b", "a"]),
        }
    );
    assert!(Arc::ptr_eq(&a, &failure(&workspace, "b")));
    assert!(Arc::ptr_eq(&a, &failure(&workspace, "c")));

    let report = workspace.run_pass(None);
    assert!(report.changes.is_empty());
    assert_eq!(report.reused, ["c"]);

    workspace.set_cell("b", "5", &[]);
    let report = workspace.run_pass(None);
    assert_eq!(report.invoked, ["b", "a", "c"]);
    assert_eq!(workspace.value("c").and_then(Value::as_number), Some(12.));
}

#[test]
fn cell_reading_its_own_name_is_a_cycle() {
    let mut workspace = Workspace::new();
    workspace.set_cell("total", "total + 1", &[]);
    workspace.run_pass(None);
    assert_eq!(failure(&workspace, "total").kind(), FailureKind::CyclicDependency);
}

#[test]
fn unknown_reference_is_its_own_failure() {
    let mut workspace = Workspace::new();
    workspace.set_cell("c", "missing + 1", &[]);
    workspace.run_pass(None);
    assert_eq!(
        *failure(&workspace, "c"),
        CellError::UnknownReference {
            name: "missing".into(),
            requested_by: Some("c".into()),
        }
    );
    assert!(workspace.value("missing").is_none());

    let report = workspace.run_pass(None);
    assert_eq!(report.reused, ["c"]);

    let (value, _) = workspace.resolve("nowhere", None);
    assert!(matches!(value.as_error().map(|error| error.kind()), Some(FailureKind::UnknownReference)));
    assert!(workspace.value("nowhere").is_none());

    workspace.set_cell("provider", "missing = 41", &outputs(&["missing"]));
    workspace.run_pass(None);
    assert_eq!(workspace.value("c").and_then(Value::as_number), Some(42.));
}

#[test]
fn duplicate_producer_is_a_conflict_until_resolved() {
    let mut workspace = Workspace::new();
    workspace.set_cell("a", "x = 1", &outputs(&["x"]));
    workspace.set_cell("b", "x = 2", &outputs(&["x"]));
    workspace.set_cell("c", "x + 1", &[]);
    assert_eq!(workspace.graph().conflicts().len(), 1);

    workspace.run_pass(None);
    assert_eq!(
        *failure(&workspace, "c"),
        CellError::DuplicateProducer {
            name: "x".into(),
            cells: outputs(&["a", "b"]),
        }
    );

    workspace.remove_cell("b");
    workspace.run_pass(None);
    assert_eq!(workspace.value("x").and_then(Value::as_number), Some(1.));
    assert_eq!(workspace.value("c").and_then(Value::as_number), Some(2.));
}

#[test]
fn renamed_output_is_evicted_immediately() {
    let mut workspace = Workspace::new();
    workspace.set_cell("a", "x = 1", &outputs(&["x"]));
    workspace.set_cell("b", "x + 1", &[]);
    workspace.run_pass(None);

    workspace.set_cell("a", "y = 1", &outputs(&["y"]));
    assert!(workspace.value("x").is_none());
    workspace.run_pass(None);
    assert_eq!(failure(&workspace, "b").kind(), FailureKind::UnknownReference);
}

#[test]
fn panicking_native_cell_is_captured() {
    let mut workspace = Workspace::new();
    workspace.set_native_cell(Cell::native("bad", Vec::<String>::new(), ["v"], |_, _| {
        panic!("index out of bounds")
    }));
    workspace.set_native_cell(Cell::native("good", Vec::<String>::new(), ["w"], |_, _| {
        Ok(vec![Value::Number(1.)])
    }));
    workspace.run_pass(None);
    assert_eq!(failure(&workspace, "v").kind(), FailureKind::Runtime);
    assert_eq!(workspace.value("w").and_then(Value::as_number), Some(1.));
}

#[test]
fn native_cell_can_raise() {
    let mut workspace = Workspace::new();
    workspace.set_native_cell(Cell::native("strict", ["v"], ["w"], |arguments, _| {
        let value = arguments[0].check()?;
        match value.as_number() {
            Some(number) if number >= 0. => Ok(vec![Value::Number(number.sqrt())]),
            _ => Err(Fault::raise("expected a non-negative number")),
        }
    }));
    workspace.set_cell("input", "v = -4", &outputs(&["v"]));
    workspace.run_pass(None);
    assert!(matches!(&*failure(&workspace, "w"), CellError::Runtime { cell, .. } if cell == "strict"));

    workspace.set_cell("input", "v = 16", &outputs(&["v"]));
    workspace.run_pass(None);
    assert_eq!(workspace.value("w").and_then(Value::as_number), Some(4.));
}

#[test]
fn oversized_list_is_a_runtime_failure() {
    let mut workspace = Workspace::new();
    workspace.set_cell("big", "List/linspace(0, 1, 100000000000)", &[]);
    workspace.set_cell("after", "1 + 1", &[]);
    workspace.run_pass(None);
    assert!(matches!(&*failure(&workspace, "big"), CellError::Runtime { cell, message, .. }
        if cell == "big" && message.contains("List/linspace")));
    assert_eq!(workspace.value("after").and_then(Value::as_number), Some(2.));
}
