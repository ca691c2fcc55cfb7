//! Purpose: Opaque object protocol plus the native function and module objects.
//! Exports: `Object`, `ObjectRef`, `NativeFunction`, `Module`, `CallArgs`, `FromValue`.
//! Role: Capability surface that every callable or namespace in the worker implements.
//! Invariants: Objects are single-threaded (`Rc`) and never shared across workers.
//! Invariants: Argument binding rejects unknown keywords and duplicate values before the call.
//! Invariants: Module attributes are only added, never removed, after construction.
use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use super::error::Error;
use super::value::{BUILTIN_NAMESPACE, Value};

pub type ObjectRef = Rc<dyn Object>;

pub trait Object {
    fn type_name(&self) -> &str;

    fn namespace(&self) -> &str {
        BUILTIN_NAMESPACE
    }

    fn repr(&self) -> String {
        format!("<{} object>", self.type_name())
    }

    fn get_attr(&self, _name: &str) -> Option<Value> {
        None
    }

    fn is_callable(&self) -> bool {
        false
    }

    fn call(&self, _args: CallArgs) -> Result<Value, Error> {
        Err(Error::type_error(format!(
            "'{}' object is not callable",
            self.type_name()
        )))
    }

    /// Length for `len()`, when the object is sized.
    fn len(&self) -> Option<usize> {
        None
    }

    /// Eager iteration for `list()`, `sum()` and friends.
    fn iter_values(&self) -> Option<Vec<Value>> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

/// Positional and keyword arguments as received, before binding.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keyword: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new(positional: Vec<Value>, keyword: BTreeMap<String, Value>) -> Self {
        Self {
            positional,
            keyword,
        }
    }

    pub fn positional(positional: Vec<Value>) -> Self {
        Self::new(positional, BTreeMap::new())
    }
}

pub trait FromValue: Sized {
    const EXPECTED: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    const EXPECTED: &'static str = "any value";

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for f64 {
    const EXPECTED: &'static str = "a number";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "an integer";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(value) => Some(*value),
            Value::Bool(value) => Some(i64::from(*value)),
            _ => None,
        }
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "a boolean";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl FromValue for String {
    const EXPECTED: &'static str = "a string";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(value) => Some(value.clone()),
            _ => None,
        }
    }
}

impl FromValue for PathBuf {
    const EXPECTED: &'static str = "a path string";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(value) => Some(PathBuf::from(value)),
            _ => None,
        }
    }
}

/// Arguments bound to a function's declared parameter names.
#[derive(Debug)]
pub struct BoundArgs<'a> {
    function: &'a str,
    params: &'static [&'static str],
    slots: Vec<Option<Value>>,
    extra: Vec<Value>,
}

impl BoundArgs<'_> {
    pub fn function(&self) -> &str {
        self.function
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        let index = self.params.iter().position(|param| *param == name)?;
        self.slots[index].as_ref()
    }

    /// A parameter that may be omitted or passed as `None`.
    pub fn optional<T: FromValue>(&self, name: &str) -> Result<Option<T>, Error> {
        match self.value(name) {
            None | Some(Value::None) => Ok(None),
            Some(value) => T::from_value(value).map(Some).ok_or_else(|| {
                Error::type_error(format!(
                    "{}() argument '{name}' must be {}, not {}",
                    self.function,
                    T::EXPECTED,
                    value.type_name()
                ))
            }),
        }
    }

    pub fn required<T: FromValue>(&self, name: &str) -> Result<T, Error> {
        self.optional(name)?.ok_or_else(|| {
            Error::type_error(format!(
                "{}() missing required argument '{name}'",
                self.function
            ))
        })
    }

    pub fn or<T: FromValue>(&self, name: &str, default: T) -> Result<T, Error> {
        Ok(self.optional(name)?.unwrap_or(default))
    }

    /// Positional arguments beyond the declared parameters (variadic functions only).
    pub fn rest(&self) -> &[Value] {
        &self.extra
    }
}

type NativeBody = dyn Fn(&BoundArgs<'_>) -> Result<Value, Error>;

pub struct NativeFunction {
    name: String,
    params: &'static [&'static str],
    variadic: bool,
    body: Box<NativeBody>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        params: &'static [&'static str],
        body: impl Fn(&BoundArgs<'_>) -> Result<Value, Error> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            variadic: false,
            body: Box::new(body),
        }
    }

    /// Accepts any number of trailing positionals, exposed through `BoundArgs::rest`.
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn into_value(self) -> Value {
        Value::Object(Rc::new(self))
    }

    fn bind(&self, args: CallArgs) -> Result<BoundArgs<'_>, Error> {
        let CallArgs {
            positional,
            keyword,
        } = args;
        let short = self.short_name();
        if !self.variadic && positional.len() > self.params.len() {
            return Err(Error::type_error(format!(
                "{short}() takes at most {} positional arguments ({} given)",
                self.params.len(),
                positional.len()
            )));
        }

        let mut slots: Vec<Option<Value>> = vec![None; self.params.len()];
        let mut extra = Vec::new();
        for (index, value) in positional.into_iter().enumerate() {
            match slots.get_mut(index) {
                Some(slot) => *slot = Some(value),
                None => extra.push(value),
            }
        }
        for (key, value) in keyword {
            let Some(index) = self.params.iter().position(|param| *param == key) else {
                return Err(Error::type_error(format!(
                    "{short}() got an unexpected keyword argument '{key}'"
                )));
            };
            if slots[index].is_some() {
                return Err(Error::type_error(format!(
                    "{short}() got multiple values for argument '{key}'"
                )));
            }
            slots[index] = Some(value);
        }

        Ok(BoundArgs {
            function: short,
            params: self.params,
            slots,
            extra,
        })
    }

    fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

impl Object for NativeFunction {
    fn type_name(&self) -> &str {
        "builtin_function"
    }

    fn repr(&self) -> String {
        format!("<built-in function {}>", self.name)
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        match name {
            "__name__" => Some(Value::str(self.short_name())),
            "__qualname__" => Some(Value::str(&self.name)),
            _ => None,
        }
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, args: CallArgs) -> Result<Value, Error> {
        let bound = self.bind(args)?;
        (self.body)(&bound)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum ModuleOrigin {
    Native,
    File(PathBuf),
}

/// Namespace object produced by the capability registry or a unit loader.
#[derive(Debug)]
pub struct Module {
    name: String,
    origin: ModuleOrigin,
    attrs: RefCell<BTreeMap<String, Value>>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: ModuleOrigin::Native,
            attrs: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            origin: ModuleOrigin::File(path.into()),
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_attr(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_function(self, function: NativeFunction) -> Self {
        let short = function.short_name().to_string();
        self.with_attr(short, function.into_value())
    }

    pub fn set_attr(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.attrs.borrow_mut().insert(name.into(), value.into());
    }
}

impl Object for Module {
    fn type_name(&self) -> &str {
        "module"
    }

    fn repr(&self) -> String {
        match &self.origin {
            ModuleOrigin::Native => format!("<module '{}' (native)>", self.name),
            ModuleOrigin::File(path) => {
                format!("<module '{}' from '{}'>", self.name, path.display())
            }
        }
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        match (name, &self.origin) {
            ("__name__", _) => return Some(Value::str(&self.name)),
            ("__file__", ModuleOrigin::File(path)) => {
                return Some(Value::Str(path.display().to_string()));
            }
            _ => {}
        }
        self.attrs.borrow().get(name).cloned()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Borrows the concrete type behind an object value.
pub fn downcast<T: 'static>(value: &Value) -> Option<&T> {
    value.as_object()?.as_any().downcast_ref::<T>()
}
