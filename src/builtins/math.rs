//! Purpose: `math` capability module.
//! Invariants: Domain errors raise `ValueError: math domain error` rather than returning NaN.
use std::f64::consts;

use crate::core::error::Error;
use crate::core::object::{BoundArgs, Module, NativeFunction};
use crate::core::value::Value;

pub(crate) fn module() -> Module {
    Module::new("math")
        .with_attr("pi", consts::PI)
        .with_attr("e", consts::E)
        .with_attr("tau", consts::TAU)
        .with_attr("inf", f64::INFINITY)
        .with_attr("nan", f64::NAN)
        .with_function(NativeFunction::new("math.sqrt", &["x"], |args| {
            let x: f64 = args.required("x")?;
            if x < 0.0 {
                return Err(domain_error());
            }
            Ok(Value::Float(x.sqrt()))
        }))
        .with_function(NativeFunction::new("math.pow", &["x", "y"], |args| {
            let x: f64 = args.required("x")?;
            let y: f64 = args.required("y")?;
            if x < 0.0 && y.fract() != 0.0 {
                return Err(domain_error());
            }
            checked_range(x.powf(y), x.is_finite() && y.is_finite())
        }))
        .with_function(NativeFunction::new("math.floor", &["x"], |args| {
            integral(args, f64::floor)
        }))
        .with_function(NativeFunction::new("math.ceil", &["x"], |args| {
            integral(args, f64::ceil)
        }))
        .with_function(NativeFunction::new("math.fabs", &["x"], |args| {
            Ok(Value::Float(args.required::<f64>("x")?.abs()))
        }))
        .with_function(NativeFunction::new("math.exp", &["x"], |args| {
            let x: f64 = args.required("x")?;
            checked_range(x.exp(), x.is_finite())
        }))
        .with_function(NativeFunction::new("math.log", &["x", "base"], |args| {
            let x: f64 = args.required("x")?;
            if x <= 0.0 {
                return Err(domain_error());
            }
            match args.optional::<f64>("base")? {
                None => Ok(Value::Float(x.ln())),
                Some(base) if base <= 0.0 => Err(domain_error()),
                Some(base) if base == 1.0 => {
                    Err(Error::raised("ZeroDivisionError").with_message("float division by zero"))
                }
                Some(base) => Ok(Value::Float(x.ln() / base.ln())),
            }
        }))
        .with_function(NativeFunction::new("math.isnan", &["x"], |args| {
            Ok(Value::Bool(args.required::<f64>("x")?.is_nan()))
        }))
        .with_function(NativeFunction::new("math.isfinite", &["x"], |args| {
            Ok(Value::Bool(args.required::<f64>("x")?.is_finite()))
        }))
}

fn domain_error() -> Error {
    Error::value_error("math domain error")
}

/// Finite inputs that overflow to infinity raise instead of returning `inf`.
fn checked_range(result: f64, finite_inputs: bool) -> Result<Value, Error> {
    if result.is_infinite() && finite_inputs {
        return Err(Error::raised("OverflowError").with_message("math range error"));
    }
    Ok(Value::Float(result))
}

fn integral(args: &BoundArgs<'_>, round: fn(f64) -> f64) -> Result<Value, Error> {
    let value: Value = args.required("x")?;
    match value {
        Value::Int(x) => Ok(Value::Int(x)),
        Value::UInt(x) => Ok(Value::UInt(x)),
        Value::Bool(x) => Ok(Value::Int(i64::from(x))),
        Value::Float(x) if x.is_nan() => Err(Error::value_error(
            "cannot convert float NaN to integer",
        )),
        Value::Float(x) if x.is_infinite() => Err(Error::raised("OverflowError")
            .with_message("cannot convert float infinity to integer")),
        Value::Float(x) => {
            let rounded = round(x);
            if rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
                return Err(Error::raised("OverflowError").with_message("integer overflow"));
            }
            Ok(Value::Int(rounded as i64))
        }
        other => Err(Error::type_error(format!(
            "must be real number, not {}",
            other.type_name()
        ))),
    }
}
