use crate::error::{CellError, Fault};
use crate::parser::BinaryOperator;
use std::fmt;
use std::sync::Arc;

/// Runtime value of a variable.
///
/// Composite values are `Arc`-wrapped, so cloning a value out of the cache is
/// O(1) and two clones keep the same identity.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Number(f64),
    Text(Arc<str>),
    List(Arc<Vec<Value>>),
    /// A captured failure flowing as data.
    Error(Arc<CellError>),
}

impl Value {
    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Value::Text(text.into())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Arc::new(items.into_iter().collect()))
    }

    pub fn numbers(numbers: impl IntoIterator<Item = f64>) -> Self {
        Self::list(numbers.into_iter().map(Value::Number))
    }

    pub fn error(error: CellError) -> Self {
        Value::Error(Arc::new(error))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Error(_) => "error",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&Arc<CellError>> {
        match self {
            Value::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Re-raise a failure value, pass everything else through.
    pub fn check(&self) -> Result<&Value, Fault> {
        match self {
            Value::Error(error) => Err(Fault::Propagated(error.clone())),
            value => Ok(value),
        }
    }

    /// Equality used for change detection.
    ///
    /// Primitives (none, bool, number, text) compare by value. Lists and
    /// failures compare by identity only, their contents are never walked.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Structural equality, the meaning of `==` in cell code.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a.equals(b)))
            }
            (Value::Number(a), Value::Number(b)) => a == b,
            _ => self.same_as(other),
        }
    }

    pub fn truthy(&self) -> Result<bool, Fault> {
        match self {
            Value::None => Ok(false),
            Value::Bool(value) => Ok(*value),
            Value::Number(number) => Ok(*number != 0.),
            Value::Text(text) => Ok(!text.is_empty()),
            Value::List(items) => Ok(!items.is_empty()),
            Value::Error(error) => Err(Fault::Propagated(error.clone())),
        }
    }

    /// Items visited by a `for` loop.
    pub fn iterate(&self) -> Result<Vec<Value>, Fault> {
        match self.check()? {
            Value::List(items) => Ok(items.as_ref().clone()),
            Value::Text(text) => Ok(text.chars().map(|c| Value::text(c.to_string())).collect()),
            other => Err(Fault::raise(format!("cannot iterate over {}", other.type_name()))),
        }
    }

    pub fn index(&self, index: &Value) -> Result<Value, Fault> {
        let target = self.check()?;
        let position = index
            .check()?
            .as_number()
            .filter(|number| number.fract() == 0.)
            .ok_or_else(|| Fault::raise(format!("index must be an integer, got {}", index)))?;
        let resolve = |len: usize| {
            let position = if position < 0. { position + len as f64 } else { position };
            (position >= 0. && position < len as f64).then_some(position as usize)
        };
        match target {
            Value::List(items) => resolve(items.len())
                .map(|position| items[position].clone())
                .ok_or_else(|| Fault::raise(format!("index {position} out of range for list of {}", items.len()))),
            Value::Text(text) => {
                let chars = text.chars().collect::<Vec<_>>();
                resolve(chars.len())
                    .map(|position| Value::text(chars[position].to_string()))
                    .ok_or_else(|| Fault::raise(format!("index {position} out of range for text of {}", chars.len())))
            }
            other => Err(Fault::raise(format!("cannot index into {}", other.type_name()))),
        }
    }

    #[cfg(feature = "cli")]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::None => serde_json::Value::Null,
            Value::Bool(value) => serde_json::Value::Bool(*value),
            Value::Number(number) => {
                if number.fract() == 0. && number.abs() < 9_007_199_254_740_992. {
                    serde_json::Value::from(*number as i64)
                } else {
                    serde_json::Value::from(*number)
                }
            }
            Value::Text(text) => serde_json::Value::String(text.to_string()),
            Value::List(items) => items.iter().map(Value::to_json).collect(),
            Value::Error(error) => serde_json::json!({
                "error": error.kind().as_str(),
                "message": error.to_string(),
            }),
        }
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Value::Number(number)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::text(text)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("none"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Number(number) => write!(f, "{number}"),
            Value::Text(text) => f.write_str(text),
            Value::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    match item {
                        Value::Text(text) => write!(f, "{text:?}")?,
                        item => write!(f, "{item}")?,
                    }
                }
                f.write_str("]")
            }
            Value::Error(error) => write!(f, "error: {error}"),
        }
    }
}

/// Apply an arithmetic or comparison operator.
///
/// Arithmetic and ordering broadcast over lists element-wise, a scalar operand
/// is paired with every item. `==` and `!=` compare whole values. `and`/`or`
/// short-circuit and are evaluated by the interpreter.
pub fn binary(operator: BinaryOperator, a: &Value, b: &Value) -> Result<Value, Fault> {
    let (a, b) = (a.check()?, b.check()?);
    match operator {
        BinaryOperator::Equal => Ok(Value::Bool(a.equals(b))),
        BinaryOperator::NotEqual => Ok(Value::Bool(!a.equals(b))),
        BinaryOperator::And | BinaryOperator::Or => {
            Err(Fault::raise(format!("'{}' is not a value operator", operator.symbol())))
        }
        _ => elementwise(operator, a, b),
    }
}

fn elementwise(operator: BinaryOperator, a: &Value, b: &Value) -> Result<Value, Fault> {
    match (a, b) {
        (Value::List(a), Value::List(b)) => {
            if a.len() != b.len() {
                return Err(Fault::raise(format!(
                    "operands of '{}' have different lengths: {} and {}",
                    operator.symbol(),
                    a.len(),
                    b.len()
                )));
            }
            a.iter()
                .zip(b.iter())
                .map(|(a, b)| binary(operator, a, b))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::list)
        }
        (Value::List(items), scalar) => items
            .iter()
            .map(|item| binary(operator, item, scalar))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::list),
        (scalar, Value::List(items)) => items
            .iter()
            .map(|item| binary(operator, scalar, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::list),
        (Value::Number(a), Value::Number(b)) => Ok(number_operator(operator, *a, *b)),
        (Value::Text(x), Value::Text(y)) => match operator {
            BinaryOperator::Add => Ok(Value::text(format!("{x}{y}"))),
            BinaryOperator::Greater => Ok(Value::Bool(x > y)),
            BinaryOperator::GreaterOrEqual => Ok(Value::Bool(x >= y)),
            BinaryOperator::Less => Ok(Value::Bool(x < y)),
            BinaryOperator::LessOrEqual => Ok(Value::Bool(x <= y)),
            _ => Err(unsupported(operator, a, b)),
        },
        _ => Err(unsupported(operator, a, b)),
    }
}

fn number_operator(operator: BinaryOperator, a: f64, b: f64) -> Value {
    match operator {
        BinaryOperator::Add => Value::Number(a + b),
        BinaryOperator::Subtract => Value::Number(a - b),
        BinaryOperator::Multiply => Value::Number(a * b),
        BinaryOperator::Divide => Value::Number(a / b),
        // Result takes the sign of the divisor.
        BinaryOperator::Remainder => Value::Number(a - b * (a / b).floor()),
        BinaryOperator::Power => Value::Number(a.powf(b)),
        BinaryOperator::Greater => Value::Bool(a > b),
        BinaryOperator::GreaterOrEqual => Value::Bool(a >= b),
        BinaryOperator::Less => Value::Bool(a < b),
        BinaryOperator::LessOrEqual => Value::Bool(a <= b),
        BinaryOperator::Equal => Value::Bool(a == b),
        BinaryOperator::NotEqual => Value::Bool(a != b),
        BinaryOperator::And | BinaryOperator::Or => Value::None,
    }
}

fn unsupported(operator: BinaryOperator, a: &Value, b: &Value) -> Fault {
    Fault::raise(format!(
        "unsupported operand types for '{}': {} and {}",
        operator.symbol(),
        a.type_name(),
        b.type_name()
    ))
}

pub fn negate(value: &Value) -> Result<Value, Fault> {
    match value.check()? {
        Value::Number(number) => Ok(Value::Number(-number)),
        Value::List(items) => items.iter().map(negate).collect::<Result<Vec<_>, _>>().map(Value::list),
        other => Err(Fault::raise(format!("cannot negate {}", other.type_name()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_compare_by_value() {
        assert!(Value::Number(1.).same_as(&Value::Number(1.)));
        assert!(Value::Number(f64::NAN).same_as(&Value::Number(f64::NAN)));
        assert!(Value::text("a").same_as(&Value::text("a")));
        assert!(Value::None.same_as(&Value::None));
        assert!(!Value::Number(1.).same_as(&Value::Bool(true)));
    }

    #[test]
    fn test_lists_compare_by_identity() {
        let list = Value::numbers([1., 2.]);
        assert!(list.same_as(&list.clone()));
        assert!(!list.same_as(&Value::numbers([1., 2.])));
        assert!(list.equals(&Value::numbers([1., 2.])));
    }

    #[test]
    fn test_broadcasting() {
        let result = binary(BinaryOperator::Multiply, &Value::numbers([1., 2., 3.]), &Value::Number(2.)).unwrap();
        assert!(result.equals(&Value::numbers([2., 4., 6.])));

        let result = binary(BinaryOperator::Add, &Value::numbers([1., 2.]), &Value::numbers([10., 20.])).unwrap();
        assert!(result.equals(&Value::numbers([11., 22.])));

        assert!(binary(BinaryOperator::Add, &Value::numbers([1.]), &Value::numbers([1., 2.])).is_err());
    }

    #[test]
    fn test_remainder_follows_divisor_sign() {
        let result = binary(BinaryOperator::Remainder, &Value::Number(-7.), &Value::Number(3.)).unwrap();
        assert_eq!(result.as_number(), Some(2.));
    }

    #[test]
    fn test_failure_is_reraised_unchanged() {
        let error = Arc::new(CellError::CyclicDependency { cycle: vec!["a".into()] });
        let fault = binary(BinaryOperator::Add, &Value::Error(error.clone()), &Value::Number(1.)).unwrap_err();
        assert!(matches!(fault, Fault::Propagated(propagated) if Arc::ptr_eq(&propagated, &error)));
    }

    #[test]
    fn test_negative_index() {
        let list = Value::numbers([1., 2., 3.]);
        assert_eq!(list.index(&Value::Number(-1.)).unwrap().as_number(), Some(3.));
        assert!(list.index(&Value::Number(3.)).is_err());
        assert!(list.index(&Value::Number(0.5)).is_err());
    }

    #[test]
    fn test_display() {
        let value = Value::list([Value::Number(1.), Value::text("a"), Value::None]);
        assert_eq!(value.to_string(), "[1, \"a\", none]");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
    }
}
