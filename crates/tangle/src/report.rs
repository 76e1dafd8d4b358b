use crate::error::CellError;
use ariadne::{Config, Label, Report, ReportKind, Source};
use std::io::Cursor;
use std::ops::Range;

/// Human readable rendering of a failure value.
///
/// Failures with a location in `source` get an annotated snippet, the rest
/// a single line.
pub fn render(error: &CellError, source: Option<&str>) -> String {
    let located: Vec<(String, Range<usize>)> = match error {
        CellError::Compile { diagnostics, .. } => diagnostics
            .iter()
            .map(|diagnostic| (diagnostic.message.clone(), diagnostic.span.clone()))
            .collect(),
        CellError::Runtime {
            message,
            span: Some(span),
            ..
        } => vec![(message.clone(), span.clone())],
        _ => Vec::new(),
    };
    let (Some(source), Some(cell)) = (source, error.cell()) else {
        return format!("Error: {error}\n");
    };
    if located.is_empty() {
        return format!("Error: {error}\n");
    }
    let mut rendered = String::new();
    for (message, span) in located {
        let span = clamp(span, source.len());
        match write_report(cell, source, &error.to_string(), &message, span) {
            Some(report) => rendered.push_str(&report),
            None => rendered.push_str(&format!("Error: {message}\n")),
        }
    }
    rendered
}

fn clamp(span: Range<usize>, len: usize) -> Range<usize> {
    span.start.min(len)..span.end.min(len)
}

fn write_report(cell: &str, source: &str, title: &str, message: &str, span: Range<usize>) -> Option<String> {
    let mut report_bytes = Cursor::new(Vec::new());
    Report::build(ReportKind::Error, (cell, span.clone()))
        .with_config(Config::default().with_color(false))
        .with_message(title)
        .with_label(Label::new((cell, span)).with_message(message))
        .finish()
        .write((cell, Source::from(source)), &mut report_bytes)
        .ok()?;
    String::from_utf8(report_bytes.into_inner()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::compile_cell;

    #[test]
    fn test_compile_error_points_at_source() {
        let source = "x = (1 +";
        let cell = compile_cell("broken", source, &[]);
        let error = cell.compile_error().unwrap();
        let rendered = render(error, Some(source));
        assert!(rendered.contains("broken"));
        assert!(rendered.contains("x = (1 +"));
    }

    #[test]
    fn test_failure_without_location_is_one_line() {
        let error = CellError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(render(&error, None), "Error: cyclic dependency: a -> b -> a\n");
    }

    #[test]
    fn test_runtime_error_with_span() {
        let error = CellError::Runtime {
            cell: "c".into(),
            message: "division failed".into(),
            span: Some(4..9),
        };
        let rendered = render(&error, Some("y = 1 / z"));
        assert!(rendered.contains("division failed"));
        assert!(rendered.contains("y = 1 / z"));
    }
}
