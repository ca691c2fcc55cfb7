//! Purpose: `builtins` capability module: conversions, aggregates, and introspection.
//! Exports: `module`, `iterate`.
//! Invariants: `range` materializes a list; `type` returns the qualified type name string.
use std::cell::RefCell;
use std::cmp::Ordering;

use super::operator::{add, compare};
use crate::core::error::Error;
use crate::core::object::{BoundArgs, Module, NativeFunction};
use crate::core::value::Value;

pub(crate) fn module() -> Module {
    Module::new("builtins")
        .with_function(NativeFunction::new("builtins.len", &["obj"], |args| {
            let value: Value = args.required("obj")?;
            length(&value).map(Value::from)
        }))
        .with_function(NativeFunction::new("builtins.str", &["object"], |args| {
            Ok(Value::Str(args.or("object", Value::str(""))?.display()))
        }))
        .with_function(NativeFunction::new("builtins.repr", &["obj"], |args| {
            Ok(Value::Str(args.required::<Value>("obj")?.repr()))
        }))
        .with_function(NativeFunction::new("builtins.int", &["x"], |args| {
            to_int(&args.or("x", Value::Int(0))?)
        }))
        .with_function(NativeFunction::new("builtins.float", &["x"], |args| {
            to_float(&args.or("x", Value::Float(0.0))?)
        }))
        .with_function(NativeFunction::new("builtins.abs", &["x"], |args| {
            match args.required::<Value>("x")? {
                Value::Int(x) => x.checked_abs().map(Value::Int).ok_or_else(|| {
                    Error::raised("OverflowError").with_message("integer overflow")
                }),
                Value::Bool(x) => Ok(Value::Int(i64::from(x))),
                Value::UInt(x) => Ok(Value::UInt(x)),
                Value::Float(x) => Ok(Value::Float(x.abs())),
                other => Err(Error::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))),
            }
        }))
        .with_function(NativeFunction::new(
            "builtins.sum",
            &["iterable", "start"],
            |args| {
                let items = iterate(&args.required("iterable")?)?;
                items
                    .iter()
                    .try_fold(args.or("start", Value::Int(0))?, |total, item| {
                        add(&total, item)
                    })
            },
        ))
        .with_function(extreme("builtins.min", Ordering::Less))
        .with_function(extreme("builtins.max", Ordering::Greater))
        .with_function(NativeFunction::new(
            "builtins.sorted",
            &["iterable", "reverse"],
            |args| {
                let mut items = iterate(&args.required("iterable")?)?;
                sort_values(&mut items)?;
                if args.or("reverse", false)? {
                    items.reverse();
                }
                Ok(Value::List(items))
            },
        ))
        .with_function(NativeFunction::new("builtins.list", &["iterable"], |args| {
            match args.optional::<Value>("iterable")? {
                None => Ok(Value::List(Vec::new())),
                Some(iterable) => iterate(&iterable).map(Value::List),
            }
        }))
        .with_function(NativeFunction::new(
            "builtins.range",
            &["start", "stop", "step"],
            range,
        ))
        .with_function(NativeFunction::new("builtins.type", &["object"], |args| {
            let value: Value = args.or("object", Value::None)?;
            Ok(Value::Str(value.qualified_type_name()))
        }))
}

fn length(value: &Value) -> Result<usize, Error> {
    let len = match value {
        Value::Str(text) => Some(text.chars().count()),
        Value::List(items) => Some(items.len()),
        Value::Dict(map) => Some(map.len()),
        Value::Object(object) => object.len(),
        _ => None,
    };
    len.ok_or_else(|| {
        Error::type_error(format!(
            "object of type '{}' has no len()",
            value.type_name()
        ))
    })
}

/// Eagerly collects the items of an iterable value.
pub(crate) fn iterate(value: &Value) -> Result<Vec<Value>, Error> {
    let items = match value {
        Value::List(items) => Some(items.clone()),
        Value::Str(text) => Some(text.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Dict(map) => Some(map.keys().cloned().map(Value::Str).collect()),
        Value::Object(object) => object.iter_values(),
        _ => None,
    };
    items.ok_or_else(|| {
        Error::type_error(format!("'{}' object is not iterable", value.type_name()))
    })
}

fn to_int(value: &Value) -> Result<Value, Error> {
    match value {
        Value::Int(_) | Value::UInt(_) => Ok(value.clone()),
        Value::Bool(x) => Ok(Value::Int(i64::from(*x))),
        Value::Float(x) if !x.is_finite() => Err(Error::value_error(format!(
            "cannot convert float {} to integer",
            value.repr()
        ))),
        Value::Float(x) => Ok(Value::Int(x.trunc() as i64)),
        Value::Str(text) => {
            let parsed = text.trim().parse::<i128>().map_err(|_| {
                Error::value_error(format!(
                    "invalid literal for int() with base 10: {}",
                    value.repr()
                ))
            })?;
            Value::integer(parsed).ok_or_else(|| {
                Error::raised("OverflowError").with_message("integer overflow")
            })
        }
        other => Err(Error::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_float(value: &Value) -> Result<Value, Error> {
    match value {
        Value::Float(x) => Ok(Value::Float(*x)),
        Value::Int(_) | Value::UInt(_) => {
            Ok(Value::Float(value.as_f64().unwrap_or(f64::NAN)))
        }
        Value::Bool(x) => Ok(Value::Float(f64::from(u8::from(*x)))),
        Value::Str(text) => text.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            Error::value_error(format!(
                "could not convert string to float: {}",
                value.repr()
            ))
        }),
        other => Err(Error::type_error(format!(
            "float() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

/// `min`/`max`: a single iterable argument, or two or more positionals.
fn extreme(name: &'static str, wanted: Ordering) -> NativeFunction {
    NativeFunction::new(name, &["iterable"], move |args| {
        let first: Value = args.required("iterable")?;
        let items = if args.rest().is_empty() {
            iterate(&first)?
        } else {
            std::iter::once(first).chain(args.rest().iter().cloned()).collect()
        };
        let mut items = items.into_iter();
        let Some(mut best) = items.next() else {
            return Err(Error::value_error(format!(
                "{}() arg is an empty sequence",
                args.function()
            )));
        };
        for item in items {
            if compare(&item, &best)? == wanted {
                best = item;
            }
        }
        Ok(best)
    })
    .variadic()
}

/// Stable sort that surfaces the first comparison failure.
fn sort_values(items: &mut [Value]) -> Result<(), Error> {
    let failure: RefCell<Option<Error>> = RefCell::new(None);
    items.sort_by(|a, b| match compare(a, b) {
        Ok(ordering) => ordering,
        Err(err) => {
            failure.borrow_mut().get_or_insert(err);
            Ordering::Equal
        }
    });
    match failure.into_inner() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn range(args: &BoundArgs<'_>) -> Result<Value, Error> {
    let first: i64 = args.required("start")?;
    let (start, stop) = match args.optional::<i64>("stop")? {
        Some(stop) => (first, stop),
        None => (0, first),
    };
    let step: i64 = args.or("step", 1)?;
    if step == 0 {
        return Err(Error::value_error("range() arg 3 must not be zero"));
    }
    let mut out = Vec::new();
    out.try_reserve_exact(range_len(start, stop, step))
        .map_err(|_| {
            Error::raised("MemoryError").with_message("range is too large to materialize")
        })?;
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        out.push(Value::Int(current));
        match current.checked_add(step) {
            Some(next) => current = next,
            None => break,
        }
    }
    Ok(Value::List(out))
}

fn range_len(start: i64, stop: i64, step: i64) -> usize {
    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    let span = if step > 0 { stop - start } else { start - stop };
    let len = if span <= 0 { 0 } else { (span - 1) / step.abs() + 1 };
    usize::try_from(len).unwrap_or(usize::MAX)
}
