use crate::artifacts::CallContext;
use crate::cell::Cell;
use crate::config::WorkspaceConfig;
use crate::error::Fault;
use crate::memo::Outcome;
use crate::value::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Run a cell body, turning whatever goes wrong into failure values.
///
/// A raised fault or a panic fills every output with the same error. Images
/// pushed before the failure are kept.
pub fn capture(cell: &Cell, arguments: &[Value], config: &WorkspaceConfig) -> Outcome {
    let mut context = CallContext::new(&cell.name, config);
    let result = panic::catch_unwind(AssertUnwindSafe(|| cell.call(arguments, &mut context)));
    let images = context.into_images();
    let fault = match result {
        Ok(Ok(values)) => return Outcome::new(values, images),
        Ok(Err(fault)) => fault,
        Err(payload) => Fault::raise(format!("panicked: {}", panic_message(&*payload))),
    };
    log::debug!("cell '{}' failed: {fault:?}", cell.name);
    Outcome::failed(fault.into_cell_error(&cell.name), cell.outputs.len()).with_artifacts(images)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::Image;
    use crate::cell::compile_cell;
    use crate::error::CellError;
    use std::sync::Arc;

    #[test]
    fn test_success_keeps_values_and_images() {
        let cell = Cell::native("n", ["a"], ["x"], |arguments, context| {
            context.push_image(Image::new(2, 2));
            Ok(vec![arguments[0].clone()])
        });
        let outcome = capture(&cell, &[Value::Number(3.)], &WorkspaceConfig::default());
        assert_eq!(outcome.values[0].as_number(), Some(3.));
        assert_eq!(outcome.artifacts.len(), 1);
    }

    #[test]
    fn test_runtime_error_fills_every_output() {
        let outputs = vec!["a".to_string(), "b".to_string()];
        let cell = compile_cell("c", "a = 1\nb = List/range(1, 2)[5]", &outputs);
        let outcome = capture(&cell, &[], &WorkspaceConfig::default());
        assert_eq!(outcome.values.len(), 2);
        let (Some(a), Some(b)) = (outcome.values[0].as_error(), outcome.values[1].as_error()) else {
            panic!("expected failures, got {:?}", outcome.values);
        };
        assert!(Arc::ptr_eq(a, b));
        assert!(matches!(&**a, CellError::Runtime { cell, .. } if cell == "c"));
    }

    #[test]
    fn test_panic_becomes_failure() {
        let cell = Cell::native("p", Vec::<String>::new(), ["x"], |_, _| panic!("native bug"));
        let outcome = capture(&cell, &[], &WorkspaceConfig::default());
        let Some(error) = outcome.values[0].as_error() else {
            panic!("expected a failure");
        };
        assert!(matches!(&**error, CellError::Runtime { message, .. } if message == "panicked: native bug"));
    }

    #[test]
    fn test_propagated_input_failure_keeps_identity() {
        let upstream = Arc::new(CellError::UnknownReference {
            name: "q".into(),
            requested_by: None,
        });
        let cell = compile_cell("c", "y * 2", &[]);
        let outcome = capture(&cell, &[Value::Error(upstream.clone())], &WorkspaceConfig::default());
        let Some(error) = outcome.values[0].as_error() else {
            panic!("expected a failure");
        };
        assert!(Arc::ptr_eq(error, &upstream));
    }
}
