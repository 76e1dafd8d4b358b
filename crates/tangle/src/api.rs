//! Built-in functions callable from cell code as `Module/function(...)`.

use crate::artifacts::CallContext;
use crate::error::Fault;
use crate::plot;
use crate::value::Value;
use std::fmt;

/// Longest list a built-in may create.
pub const MAX_LIST_LEN: usize = 10_000_000;

pub type FunctionBody = fn(&[Value], &mut CallContext) -> Result<Value, Fault>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Between(usize, usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Self::Exact(expected) => count == expected,
            Self::Between(min, max) => (min..=max).contains(&count),
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Exact(1) => write!(f, "1 argument"),
            Self::Exact(count) => write!(f, "{count} arguments"),
            Self::Between(min, max) => write!(f, "{min} to {max} arguments"),
        }
    }
}

#[derive(Clone, Copy)]
pub struct FunctionDefinition {
    pub arity: Arity,
    pub body: FunctionBody,
    /// Failure values are passed in as arguments instead of being re-raised.
    pub accepts_errors: bool,
}

pub fn function_definition(path: &[impl AsRef<str>]) -> Option<FunctionDefinition> {
    let [module, function] = path else {
        return None;
    };
    let (body, arity): (FunctionBody, Arity) = match (module.as_ref(), function.as_ref()) {
        ("Math", "sin") => (function_math_sin, Arity::Exact(1)),
        ("Math", "cos") => (function_math_cos, Arity::Exact(1)),
        ("Math", "tan") => (function_math_tan, Arity::Exact(1)),
        ("Math", "sqrt") => (function_math_sqrt, Arity::Exact(1)),
        ("Math", "abs") => (function_math_abs, Arity::Exact(1)),
        ("Math", "exp") => (function_math_exp, Arity::Exact(1)),
        ("Math", "ln") => (function_math_ln, Arity::Exact(1)),
        ("Math", "floor") => (function_math_floor, Arity::Exact(1)),
        ("Math", "ceil") => (function_math_ceil, Arity::Exact(1)),
        ("Math", "round") => (function_math_round, Arity::Exact(1)),
        ("Math", "min") => (function_math_min, Arity::Exact(2)),
        ("Math", "max") => (function_math_max, Arity::Exact(2)),
        ("Math", "pow") => (function_math_pow, Arity::Exact(2)),
        ("List", "range") => (function_list_range, Arity::Between(1, 3)),
        ("List", "linspace") => (function_list_linspace, Arity::Exact(3)),
        ("List", "len") => (function_list_len, Arity::Exact(1)),
        ("List", "sum") => (function_list_sum, Arity::Exact(1)),
        ("List", "mean") => (function_list_mean, Arity::Exact(1)),
        ("List", "append") => (function_list_append, Arity::Exact(2)),
        ("List", "concat") => (function_list_concat, Arity::Exact(2)),
        ("Text", "from") => (function_text_from, Arity::Exact(1)),
        ("Text", "length") => (function_text_length, Arity::Exact(1)),
        ("Error", "is") => (function_error_is, Arity::Exact(1)),
        ("Error", "or") => (function_error_or, Arity::Exact(2)),
        ("Error", "message") => (function_error_message, Arity::Exact(1)),
        ("Error", "raise") => (function_error_raise, Arity::Exact(1)),
        ("Plot", "line") => (function_plot_line, Arity::Exact(2)),
        ("Plot", "scatter") => (function_plot_scatter, Arity::Exact(2)),
        ("Log", "info") => (function_log_info, Arity::Exact(1)),
        _ => return None,
    };
    let accepts_errors = matches!(module.as_ref(), "Error" | "Log") && function.as_ref() != "raise";
    Some(FunctionDefinition {
        arity,
        body,
        accepts_errors,
    })
}

fn number(value: &Value, function: &str) -> Result<f64, Fault> {
    value
        .as_number()
        .ok_or_else(|| Fault::raise(format!("{function} expects a number, got {}", value.type_name())))
}

fn check_list_len(count: f64, function: &str) -> Result<(), Fault> {
    if count > MAX_LIST_LEN as f64 {
        return Err(Fault::raise(format!(
            "{function} would produce {count} items, the limit is {MAX_LIST_LEN}"
        )));
    }
    Ok(())
}

fn numbers(value: &Value, function: &str) -> Result<Vec<f64>, Fault> {
    match value {
        Value::List(items) => items.iter().map(|item| number(item, function)).collect(),
        other => Err(Fault::raise(format!("{function} expects a list of numbers, got {}", other.type_name()))),
    }
}

/// Apply `f` to a number or to every number of a (nested) list.
fn map_number(value: &Value, function: &str, f: fn(f64) -> f64) -> Result<Value, Fault> {
    match value {
        Value::Number(x) => Ok(Value::Number(f(*x))),
        Value::List(items) => items
            .iter()
            .map(|item| map_number(item, function, f))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::list),
        other => Err(Fault::raise(format!("{function} expects a number, got {}", other.type_name()))),
    }
}

pub fn function_math_sin(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    map_number(&arguments[0], "Math/sin", f64::sin)
}

pub fn function_math_cos(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    map_number(&arguments[0], "Math/cos", f64::cos)
}

pub fn function_math_tan(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    map_number(&arguments[0], "Math/tan", f64::tan)
}

pub fn function_math_sqrt(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    map_number(&arguments[0], "Math/sqrt", f64::sqrt)
}

pub fn function_math_abs(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    map_number(&arguments[0], "Math/abs", f64::abs)
}

pub fn function_math_exp(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    map_number(&arguments[0], "Math/exp", f64::exp)
}

pub fn function_math_ln(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    map_number(&arguments[0], "Math/ln", f64::ln)
}

pub fn function_math_floor(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    map_number(&arguments[0], "Math/floor", f64::floor)
}

pub fn function_math_ceil(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    map_number(&arguments[0], "Math/ceil", f64::ceil)
}

pub fn function_math_round(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    map_number(&arguments[0], "Math/round", f64::round)
}

pub fn function_math_min(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    let (a, b) = (number(&arguments[0], "Math/min")?, number(&arguments[1], "Math/min")?);
    Ok(Value::Number(a.min(b)))
}

pub fn function_math_max(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    let (a, b) = (number(&arguments[0], "Math/max")?, number(&arguments[1], "Math/max")?);
    Ok(Value::Number(a.max(b)))
}

pub fn function_math_pow(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    crate::value::binary(crate::parser::BinaryOperator::Power, &arguments[0], &arguments[1])
}

/// `range(stop)`, `range(start, stop)` or `range(start, stop, step)`, stop excluded.
pub fn function_list_range(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    let parameters = arguments
        .iter()
        .map(|argument| number(argument, "List/range"))
        .collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match parameters.as_slice() {
        [stop] => (0., *stop, 1.),
        [start, stop] => (*start, *stop, 1.),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(Fault::raise("List/range expects 1 to 3 arguments")),
    };
    if step == 0. || !step.is_finite() {
        return Err(Fault::raise("List/range step must be a non-zero number"));
    }
    let count = ((stop - start) / step).ceil().max(0.);
    check_list_len(count, "List/range")?;
    Ok(Value::numbers((0..count as usize).map(|index| start + step * index as f64)))
}

/// `count` evenly spaced numbers from `start` to `stop`, both included.
pub fn function_list_linspace(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    let start = number(&arguments[0], "List/linspace")?;
    let stop = number(&arguments[1], "List/linspace")?;
    let count = number(&arguments[2], "List/linspace")?;
    if count < 0. || count.fract() != 0. {
        return Err(Fault::raise("List/linspace count must be a non-negative integer"));
    }
    check_list_len(count, "List/linspace")?;
    let count = count as usize;
    if count == 1 {
        return Ok(Value::numbers([start]));
    }
    let step = (stop - start) / (count as f64 - 1.);
    Ok(Value::numbers((0..count).map(|index| start + step * index as f64)))
}

pub fn function_list_len(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    match &arguments[0] {
        Value::List(items) => Ok(Value::Number(items.len() as f64)),
        other => Err(Fault::raise(format!("List/len expects a list, got {}", other.type_name()))),
    }
}

pub fn function_list_sum(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    Ok(Value::Number(numbers(&arguments[0], "List/sum")?.iter().sum()))
}

pub fn function_list_mean(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    let numbers = numbers(&arguments[0], "List/mean")?;
    if numbers.is_empty() {
        return Err(Fault::raise("List/mean of an empty list"));
    }
    Ok(Value::Number(numbers.iter().sum::<f64>() / numbers.len() as f64))
}

pub fn function_list_append(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    match &arguments[0] {
        Value::List(items) => Ok(Value::list(items.iter().cloned().chain([arguments[1].clone()]))),
        other => Err(Fault::raise(format!("List/append expects a list, got {}", other.type_name()))),
    }
}

pub fn function_list_concat(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    match (&arguments[0], &arguments[1]) {
        (Value::List(a), Value::List(b)) => Ok(Value::list(a.iter().chain(b.iter()).cloned())),
        (a, b) => Err(Fault::raise(format!(
            "List/concat expects two lists, got {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

pub fn function_text_from(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    Ok(Value::text(arguments[0].to_string()))
}

pub fn function_text_length(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    match &arguments[0] {
        Value::Text(text) => Ok(Value::Number(text.chars().count() as f64)),
        other => Err(Fault::raise(format!("Text/length expects text, got {}", other.type_name()))),
    }
}

pub fn function_error_is(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    Ok(Value::Bool(arguments[0].is_error()))
}

/// The first argument unless it is a failure, then the fallback.
pub fn function_error_or(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    match &arguments[0] {
        Value::Error(_) => Ok(arguments[1].clone()),
        value => Ok(value.clone()),
    }
}

pub fn function_error_message(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    match &arguments[0] {
        Value::Error(error) => Ok(Value::text(error.to_string())),
        _ => Ok(Value::None),
    }
}

pub fn function_error_raise(arguments: &[Value], _: &mut CallContext) -> Result<Value, Fault> {
    Err(Fault::raise(arguments[0].to_string()))
}

fn plot_series(arguments: &[Value], context: &mut CallContext, style: plot::Style, function: &str) -> Result<Value, Fault> {
    let ys = numbers(&arguments[1], function)?;
    let xs = match &arguments[0] {
        Value::None => (0..ys.len()).map(|index| index as f64).collect(),
        xs => numbers(xs, function)?,
    };
    if xs.len() != ys.len() {
        return Err(Fault::raise(format!(
            "{function} got {} x values and {} y values",
            xs.len(),
            ys.len()
        )));
    }
    let config = context.config();
    config.check_plot_size().map_err(Fault::raise)?;
    let image = plot::render(&xs, &ys, style, config.plot_width, config.plot_height);
    context.push_image(image);
    Ok(Value::None)
}

/// `Plot/line(xs, ys)`, `xs` may be `none` to plot against item indices.
pub fn function_plot_line(arguments: &[Value], context: &mut CallContext) -> Result<Value, Fault> {
    plot_series(arguments, context, plot::Style::Line, "Plot/line")
}

pub fn function_plot_scatter(arguments: &[Value], context: &mut CallContext) -> Result<Value, Fault> {
    plot_series(arguments, context, plot::Style::Scatter, "Plot/scatter")
}

pub fn function_log_info(arguments: &[Value], context: &mut CallContext) -> Result<Value, Fault> {
    log::info!("[{}] {}", context.cell(), arguments[0]);
    Ok(Value::None)
}
