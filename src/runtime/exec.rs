//! Purpose: Attribute lookup and invocation against resolved targets.
//! Exports: `get_attribute`, `execute`, `Trace`.
//! Role: Call Executor; turns (target, method, args) into a raw result or a failure.
//! Invariants: Non-callable candidates are returned as-is (attribute-read fallback).
//! Invariants: Every failure leaves with the trace of the steps executed so far.
use crate::core::error::{Error, ErrorKind};
use crate::core::object::{CallArgs, Module, downcast};
use crate::core::value::Value;

/// Ordered record of the steps taken while serving one request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Trace {
    steps: Vec<String>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&mut self, step: impl Into<String>) {
        self.steps.push(step.into());
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// Attaches the recorded steps ahead of any frames the error already carries.
    pub fn fail(&self, err: Error) -> Error {
        err.with_frames(self.steps.iter().cloned())
    }
}

pub fn get_attribute(target: &Value, name: &str) -> Result<Value, Error> {
    let found = match target {
        Value::Object(object) => object.get_attr(name),
        _ => None,
    };
    found.ok_or_else(|| {
        let owner = match downcast::<Module>(target) {
            Some(module) => format!("module '{}'", module.name()),
            None => format!("'{}' object", target.type_name()),
        };
        Error::new(ErrorKind::Attribute).with_message(format!("{owner} has no attribute '{name}'"))
    })
}

/// Picks `target.method` (or `target` itself) and invokes it when callable.
pub fn execute(
    target: &Value,
    target_label: &str,
    method: Option<&str>,
    args: CallArgs,
    trace: &mut Trace,
) -> Result<Value, Error> {
    let (candidate, label) = match method {
        Some(method) => {
            trace.step(format!("lookup attribute '{method}' on {target_label}"));
            let candidate = get_attribute(target, method).map_err(|err| trace.fail(err))?;
            (candidate, format!("{target_label}.{method}"))
        }
        None => (target.clone(), target_label.to_string()),
    };

    let callable = match &candidate {
        Value::Object(object) if object.is_callable() => Some(object.clone()),
        _ => None,
    };
    let Some(object) = callable else {
        return Ok(candidate);
    };

    trace.step(format!(
        "invoke {label} with {} positional and {} keyword arguments",
        args.positional.len(),
        args.keyword.len()
    ));
    object.call(args).map_err(|err| trace.fail(err))
}
