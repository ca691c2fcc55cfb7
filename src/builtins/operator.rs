//! Purpose: `operator` module plus the arithmetic and ordering shared by other builtins.
//! Exports: `module`, `add`, `compare`.
//! Invariants: Integer arithmetic is checked; overflow raises instead of wrapping.
//! Invariants: Sequence repetition reserves its output up front and raises `MemoryError`
//! when that fails.
use std::cmp::Ordering;

use crate::core::error::Error;
use crate::core::object::{Module, NativeFunction};
use crate::core::value::Value;

pub(crate) fn module() -> Module {
    Module::new("operator")
        .with_function(NativeFunction::new("operator.getitem", &["a", "b"], |args| {
            getitem(&args.required::<Value>("a")?, &args.required::<Value>("b")?)
        }))
        .with_function(binary("operator.add", add))
        .with_function(binary("operator.sub", sub))
        .with_function(binary("operator.mul", mul))
        .with_function(binary("operator.truediv", truediv))
}

fn binary(name: &'static str, op: fn(&Value, &Value) -> Result<Value, Error>) -> NativeFunction {
    NativeFunction::new(name, &["a", "b"], move |args| {
        op(&args.required::<Value>("a")?, &args.required::<Value>("b")?)
    })
}

fn unsupported(symbol: &str, a: &Value, b: &Value) -> Error {
    Error::type_error(format!(
        "unsupported operand type(s) for {symbol}: '{}' and '{}'",
        a.type_name(),
        b.type_name()
    ))
}

fn overflow() -> Error {
    Error::raised("OverflowError").with_message("integer overflow")
}

fn out_of_memory() -> Error {
    Error::raised("MemoryError").with_message("cannot allocate repeated sequence")
}

/// Integer view that admits bools, matching numeric promotion rules.
fn int_of(value: &Value) -> Option<i128> {
    match value {
        Value::Bool(value) => Some(i128::from(*value)),
        other => other.as_i128(),
    }
}

fn float_of(value: &Value) -> Option<f64> {
    match value {
        Value::Float(value) => Some(*value),
        other => int_of(other).map(|value| value as f64),
    }
}

fn numeric(
    a: &Value,
    b: &Value,
    ints: fn(i128, i128) -> Option<i128>,
    floats: fn(f64, f64) -> f64,
) -> Option<Result<Value, Error>> {
    if let (Some(x), Some(y)) = (int_of(a), int_of(b)) {
        return Some(ints(x, y).and_then(Value::integer).ok_or_else(overflow));
    }
    match (float_of(a), float_of(b)) {
        (Some(x), Some(y)) => Some(Ok(Value::Float(floats(x, y)))),
        _ => None,
    }
}

pub(crate) fn add(a: &Value, b: &Value) -> Result<Value, Error> {
    if let Some(result) = numeric(a, b, i128::checked_add, |x, y| x + y) {
        return result;
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Value::Str(format!("{x}{y}"))),
        (Value::List(x), Value::List(y)) => {
            Ok(Value::List(x.iter().chain(y.iter()).cloned().collect()))
        }
        _ => Err(unsupported("+", a, b)),
    }
}

fn sub(a: &Value, b: &Value) -> Result<Value, Error> {
    numeric(a, b, i128::checked_sub, |x, y| x - y).unwrap_or_else(|| Err(unsupported("-", a, b)))
}

fn mul(a: &Value, b: &Value) -> Result<Value, Error> {
    if let Some(result) = numeric(a, b, i128::checked_mul, |x, y| x * y) {
        return result;
    }
    match (a, b) {
        (Value::Str(text), times) | (times, Value::Str(text)) if int_of(times).is_some() => {
            repeat_str(text, repeat_count(times))
        }
        (Value::List(items), times) | (times, Value::List(items)) if int_of(times).is_some() => {
            repeat_list(items, repeat_count(times))
        }
        _ => Err(unsupported("*", a, b)),
    }
}

/// Negative counts repeat zero times.
fn repeat_count(times: &Value) -> usize {
    int_of(times).map_or(0, |n| usize::try_from(n.max(0)).unwrap_or(usize::MAX))
}

fn repeated_len(unit: usize, times: usize) -> Result<usize, Error> {
    unit.checked_mul(times).ok_or_else(|| {
        Error::raised("OverflowError").with_message("repeated sequence is too long")
    })
}

fn repeat_str(text: &str, times: usize) -> Result<Value, Error> {
    if text.is_empty() || times == 0 {
        return Ok(Value::str(""));
    }
    let mut out = String::new();
    out.try_reserve_exact(repeated_len(text.len(), times)?)
        .map_err(|_| out_of_memory())?;
    for _ in 0..times {
        out.push_str(text);
    }
    Ok(Value::Str(out))
}

fn repeat_list(items: &[Value], times: usize) -> Result<Value, Error> {
    if items.is_empty() || times == 0 {
        return Ok(Value::List(Vec::new()));
    }
    let mut out = Vec::new();
    out.try_reserve_exact(repeated_len(items.len(), times)?)
        .map_err(|_| out_of_memory())?;
    for _ in 0..times {
        out.extend(items.iter().cloned());
    }
    Ok(Value::List(out))
}

fn truediv(a: &Value, b: &Value) -> Result<Value, Error> {
    let (Some(x), Some(y)) = (float_of(a), float_of(b)) else {
        return Err(unsupported("/", a, b));
    };
    if y == 0.0 {
        return Err(Error::raised("ZeroDivisionError").with_message("division by zero"));
    }
    Ok(Value::Float(x / y))
}

fn getitem(container: &Value, key: &Value) -> Result<Value, Error> {
    match container {
        Value::List(items) => {
            let index = sequence_index(key, items.len(), "list")?;
            Ok(items[index].clone())
        }
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let index = sequence_index(key, chars.len(), "string")?;
            Ok(Value::Str(chars[index].to_string()))
        }
        Value::Dict(map) => {
            let Value::Str(name) = key else {
                return Err(Error::raised("KeyError").with_message(key.repr()));
            };
            map.get(name)
                .cloned()
                .ok_or_else(|| Error::raised("KeyError").with_message(key.repr()))
        }
        other => Err(Error::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn sequence_index(key: &Value, len: usize, kind: &str) -> Result<usize, Error> {
    let Some(raw) = int_of(key) else {
        return Err(Error::type_error(format!(
            "{kind} indices must be integers, not {}",
            key.type_name()
        )));
    };
    let len = i128::try_from(len).map_err(|_| overflow())?;
    let index = if raw < 0 { raw + len } else { raw };
    if (0..len).contains(&index) {
        usize::try_from(index).map_err(|_| overflow())
    } else {
        Err(Error::raised("IndexError").with_message(format!("{kind} index out of range")))
    }
}

/// Total order over comparable values; mixed or opaque operands raise `TypeError`.
pub(crate) fn compare(a: &Value, b: &Value) -> Result<Ordering, Error> {
    if let (Some(x), Some(y)) = (int_of(a), int_of(b)) {
        return Ok(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (float_of(a), float_of(b)) {
        return Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal));
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        (Value::List(x), Value::List(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ordering = compare(left, right)?;
                if ordering != Ordering::Equal {
                    return Ok(ordering);
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        _ => Err(Error::type_error(format!(
            "'<' not supported between instances of '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}
