//! Purpose: Map target descriptors and handle-bearing arguments to live values.
//! Exports: `Resolver`, `TargetKind`, `target_kind`, `REF_ARG_KEY`.
//! Role: Target Resolver; first matching rule wins (handle, unit path, dotted module).
//! Invariants: Handle descriptors never fall back to module or file resolution.
//! Invariants: Unit files are loaded fresh per resolution and recorded under their stem.
use std::path::Path;
use std::rc::Rc;

use serde_json::Value as JsonValue;

use super::loader::UnitLoader;
use super::registry::ModuleRegistry;
use crate::core::error::{Error, ErrorKind};
use crate::core::handles::{HANDLE_PREFIX, HandleStore};
use crate::core::value::Value;

/// Key of the single-entry object that passes a handle as a call argument.
pub const REF_ARG_KEY: &str = "__ref__";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TargetKind<'a> {
    Handle(&'a str),
    Unit(&'a Path),
    Module(&'a str),
}

pub fn target_kind<'a>(descriptor: &'a str, unit_extension: &str) -> TargetKind<'a> {
    if descriptor.starts_with(HANDLE_PREFIX) {
        return TargetKind::Handle(descriptor);
    }
    let has_extension = descriptor
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && ext == unit_extension);
    if descriptor.starts_with("./") || descriptor.starts_with("../") || has_extension {
        return TargetKind::Unit(Path::new(descriptor));
    }
    TargetKind::Module(descriptor)
}

pub struct Resolver<'a> {
    pub registry: &'a mut ModuleRegistry,
    pub store: &'a HandleStore,
    pub loader: Option<&'a dyn UnitLoader>,
    pub unit_extension: &'a str,
}

impl Resolver<'_> {
    pub fn resolve(&mut self, descriptor: &str) -> Result<Value, Error> {
        match target_kind(descriptor, self.unit_extension) {
            TargetKind::Handle(id) => self.store.get(id).cloned(),
            TargetKind::Unit(path) => self.load_unit(path),
            TargetKind::Module(path) => self
                .registry
                .import(path)
                .map(|module| Value::Object(module)),
        }
    }

    fn load_unit(&mut self, path: &Path) -> Result<Value, Error> {
        let Some(loader) = self.loader else {
            return Err(Error::new(ErrorKind::ModuleNotFound)
                .with_message(format!("file units are disabled: {}", path.display())));
        };
        if !path.exists() {
            return Err(Error::new(ErrorKind::ModuleNotFound)
                .with_message(format!("Unit file not found: {}", path.display()))
                .with_path(path));
        }
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let module = Rc::new(loader.load(path, &name, self.registry)?);
        tracing::debug!(unit = %path.display(), module = %name, "unit loaded");
        self.registry.insert_loaded(name, Rc::clone(&module));
        Ok(Value::Object(module))
    }

    /// Converts wire arguments, replacing `{"__ref__": id}` objects with stored values.
    pub fn argument(&self, value: JsonValue) -> Result<Value, Error> {
        match value {
            JsonValue::Object(map) if is_ref_argument(&map) => {
                let id = map.get(REF_ARG_KEY).and_then(JsonValue::as_str).unwrap_or_default();
                self.store.get(id).cloned()
            }
            JsonValue::Object(map) => {
                let mut out = std::collections::BTreeMap::new();
                for (key, value) in map {
                    out.insert(key, self.argument(value)?);
                }
                Ok(Value::Dict(out))
            }
            JsonValue::Array(items) => items
                .into_iter()
                .map(|item| self.argument(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            other => Ok(Value::from_wire(other)),
        }
    }
}

fn is_ref_argument(map: &serde_json::Map<String, JsonValue>) -> bool {
    map.len() == 1 && map.get(REF_ARG_KEY).is_some_and(JsonValue::is_string)
}
