use tangle::{Notebook, Value, Workspace};

const SINE: &str = include_str!("../../../demos/sine.tgl");

#[test]
fn demo_notebook_evaluates() {
    let notebook = Notebook::parse(SINE).unwrap();
    assert_eq!(notebook.cells.len(), 7);
    assert_eq!(notebook.expectations.len(), 4);

    let mut workspace = Workspace::new();
    workspace.update(&notebook.sources(), &notebook.outputs());
    assert_eq!(workspace.compile_errors().count(), 0);

    let report = workspace.run_pass(None);
    assert_eq!(workspace.value("energy").and_then(Value::as_number), Some(4.));
    assert_eq!(workspace.value("label").and_then(Value::as_text), Some("energy: 4"));
    assert_eq!(workspace.value("guarded").and_then(Value::as_number), Some(0.));
    assert!(workspace.value("fragile").is_some_and(Value::is_error));
    assert_eq!(report.artifacts["chart"].len(), 1);
}

#[test]
fn editing_a_notebook_reruns_the_affected_cells() {
    let notebook = Notebook::parse(SINE).unwrap();
    let mut sources = notebook.sources();
    let mut workspace = Workspace::new();
    workspace.update(&sources, &notebook.outputs());
    workspace.run_pass(None);

    sources.insert("settings".to_string(), "samples = 9\nperiods = 2".to_string());
    workspace.update(&sources, &notebook.outputs());
    let report = workspace.run_pass(None);
    // Two periods still sum to the same energy, so `label` is left alone.
    assert_eq!(report.invoked, ["settings", "wave", "energy", "chart"]);
    assert_eq!(report.reused, ["label", "fragile", "guarded"]);
}
