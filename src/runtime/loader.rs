//! Purpose: Pluggable loading of file-based units into namespace objects.
//! Exports: `UnitLoader`, `JsonUnitLoader`, `Partial`.
//! Role: Host-integration seam for file-path targets; the JSON loader is the default.
//! Invariants: Units are read from disk on every load; no loader-side caching.
//! Invariants: Each top-level definition becomes exactly one namespace attribute.
//! Invariants: Load failures for existing files are `InvalidUnit` and name the file.
use std::any::Any;
use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value as JsonValue};

use super::registry::ModuleRegistry;
use crate::core::error::{Error, ErrorKind};
use crate::core::object::{CallArgs, Module, Object};
use crate::core::value::Value;

pub const DEFAULT_UNIT_EXTENSION: &str = "json";

pub trait UnitLoader {
    /// File extension (without the dot) that marks a target as a unit path.
    fn extension(&self) -> &str;

    /// Executes the unit at `path` into a namespace named `name`.
    fn load(
        &self,
        path: &Path,
        name: &str,
        registry: &mut ModuleRegistry,
    ) -> Result<Module, Error>;
}

/// Loads JSON object files whose top-level keys are definitions.
#[derive(Clone, Debug)]
pub struct JsonUnitLoader {
    extension: String,
}

impl JsonUnitLoader {
    pub fn new() -> Self {
        Self {
            extension: DEFAULT_UNIT_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

impl Default for JsonUnitLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitLoader for JsonUnitLoader {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn load(
        &self,
        path: &Path,
        name: &str,
        registry: &mut ModuleRegistry,
    ) -> Result<Module, Error> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            invalid_unit(path)
                .with_message(format!("failed to read unit: {err}"))
                .with_source(err)
        })?;
        let document: JsonValue = serde_json::from_str(&text).map_err(|err| {
            invalid_unit(path)
                .with_message(format!("unit is not valid JSON: {err}"))
                .with_source(err)
        })?;
        let JsonValue::Object(definitions) = document else {
            return Err(invalid_unit(path).with_message("unit must be a JSON object"));
        };

        let module = Module::from_file(name, path);
        for (key, definition) in definitions {
            let value = evaluate(&key, definition, registry).map_err(|err| {
                invalid_unit(path)
                    .with_message(format!("definition '{key}': {}", err.message()))
                    .with_source(err)
            })?;
            module.set_attr(key, value);
        }
        Ok(module)
    }
}

fn invalid_unit(path: &Path) -> Error {
    Error::new(ErrorKind::InvalidUnit).with_path(path)
}

fn evaluate(
    key: &str,
    definition: JsonValue,
    registry: &mut ModuleRegistry,
) -> Result<Value, Error> {
    let JsonValue::Object(fields) = definition else {
        return Ok(Value::from_wire(definition));
    };
    let mut directives = fields.keys().filter(|field| field.starts_with('$'));
    let Some(directive) = directives.next().cloned() else {
        return Ok(Value::from_wire(JsonValue::Object(fields)));
    };
    if directives.next().is_some() {
        return Err(Error::new(ErrorKind::InvalidUnit).with_message("more than one directive"));
    }

    let path = fields.get(&directive).and_then(JsonValue::as_str).ok_or_else(|| {
        Error::new(ErrorKind::InvalidUnit).with_message(format!("{directive} requires a string"))
    })?;
    match directive.as_str() {
        "$import" => Ok(Value::Object(registry.import(path)?)),
        "$bind" => registry.resolve_attr_path(path),
        "$partial" => {
            let target = registry.resolve_attr_path(path)?;
            if !target.is_callable() {
                return Err(Error::new(ErrorKind::InvalidUnit)
                    .with_message(format!("{path} is not callable")));
            }
            let (args, kwargs) = partial_arguments(&fields)?;
            Ok(Value::object(Partial {
                name: key.to_string(),
                target,
                args,
                kwargs,
            }))
        }
        other => Err(Error::new(ErrorKind::InvalidUnit)
            .with_message(format!("unknown directive {other}"))),
    }
}

fn partial_arguments(
    fields: &Map<String, JsonValue>,
) -> Result<(Vec<Value>, BTreeMap<String, Value>), Error> {
    let args = match fields.get("args") {
        None | Some(JsonValue::Null) => Vec::new(),
        Some(JsonValue::Array(items)) => items.iter().cloned().map(Value::from_wire).collect(),
        Some(_) => {
            return Err(Error::new(ErrorKind::InvalidUnit).with_message("args must be an array"));
        }
    };
    let kwargs = match fields.get("kwargs") {
        None | Some(JsonValue::Null) => BTreeMap::new(),
        Some(JsonValue::Object(map)) => map
            .iter()
            .map(|(key, value)| (key.clone(), Value::from_wire(value.clone())))
            .collect(),
        Some(_) => {
            return Err(
                Error::new(ErrorKind::InvalidUnit).with_message("kwargs must be an object")
            );
        }
    };
    Ok((args, kwargs))
}

/// Callable that pre-applies positional and keyword arguments to a target.
pub struct Partial {
    name: String,
    target: Value,
    args: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
}

impl Object for Partial {
    fn type_name(&self) -> &str {
        "partial"
    }

    fn namespace(&self) -> &str {
        "functools"
    }

    fn repr(&self) -> String {
        let mut parts = vec![self.target.repr()];
        parts.extend(self.args.iter().map(Value::repr));
        parts.extend(
            self.kwargs
                .iter()
                .map(|(key, value)| format!("{key}={}", value.repr())),
        );
        format!("functools.partial({})", parts.join(", "))
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        match name {
            "__name__" => Some(Value::str(&self.name)),
            "func" => Some(self.target.clone()),
            "args" => Some(Value::List(self.args.clone())),
            "keywords" => Some(Value::Dict(self.kwargs.clone())),
            _ => None,
        }
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, args: CallArgs) -> Result<Value, Error> {
        let Some(target) = self.target.as_object() else {
            return Err(Error::type_error(format!("partial '{}' has no target", self.name)));
        };
        let mut positional = self.args.clone();
        positional.extend(args.positional);
        let mut keyword = self.kwargs.clone();
        keyword.extend(args.keyword);
        target
            .call(CallArgs::new(positional, keyword))
            .map_err(|err| err.with_frame(format!("call through partial '{}'", self.name)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
