//! Purpose: Capability registry mapping dotted module paths to native namespaces.
//! Exports: `ModuleRegistry`, `ModuleFactory`.
//! Role: Stands in for ambient import machinery; populated once at startup.
//! Invariants: A dotted path imports only if every prefix segment is registered or loaded.
//! Invariants: Imported modules are cached; child modules are attached to their parent.
//! Invariants: Importing a module also imports its registered direct children, so a
//! parent's child attribute and the child's own import are the same object.
//! Invariants: Loaded file units overwrite any earlier namespace recorded under the same name.
use std::collections::HashMap;
use std::rc::Rc;

use crate::core::error::{Error, ErrorKind};
use crate::core::object::Module;
use crate::core::value::Value;

pub type ModuleFactory = Box<dyn Fn() -> Module>;

#[derive(Default)]
pub struct ModuleRegistry {
    factories: HashMap<String, ModuleFactory>,
    loaded: HashMap<String, Rc<Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: impl Into<String>, factory: impl Fn() -> Module + 'static) {
        let path = path.into();
        self.loaded.remove(&path);
        self.factories.insert(path, Box::new(factory));
    }

    /// Records an already-built namespace, e.g. a loaded unit file.
    pub fn insert_loaded(&mut self, path: impl Into<String>, module: Rc<Module>) {
        self.loaded.insert(path.into(), module);
    }

    pub fn is_registered(&self, path: &str) -> bool {
        self.factories.contains_key(path) || self.loaded.contains_key(path)
    }

    pub fn import(&mut self, path: &str) -> Result<Rc<Module>, Error> {
        if path.is_empty() {
            return Err(Error::new(ErrorKind::ModuleNotFound).with_message("Empty module name"));
        }
        if let Some(module) = self.loaded.get(path) {
            return Ok(Rc::clone(module));
        }

        let parent = match path.rsplit_once('.') {
            Some((parent_path, _)) => Some(self.import(parent_path)?),
            None => None,
        };
        // Importing the parent may already have imported this child.
        if let Some(module) = self.loaded.get(path) {
            return Ok(Rc::clone(module));
        }
        let factory = self.factories.get(path).ok_or_else(|| {
            Error::new(ErrorKind::ModuleNotFound).with_message(format!("No module named '{path}'"))
        })?;
        let module = Rc::new(factory());
        if let (Some(parent), Some((_, child))) = (parent, path.rsplit_once('.')) {
            parent.set_attr(child, Value::Object(module.clone()));
        }
        tracing::debug!(module = path, "module imported");
        self.loaded.insert(path.to_string(), Rc::clone(&module));
        for child in self.child_paths(path) {
            self.import(&child)?;
        }
        Ok(module)
    }

    fn child_paths(&self, parent: &str) -> Vec<String> {
        let mut children: Vec<String> = self
            .factories
            .keys()
            .filter(|path| {
                path.strip_prefix(parent)
                    .and_then(|rest| rest.strip_prefix('.'))
                    .is_some_and(|name| !name.is_empty() && !name.contains('.'))
            })
            .filter(|path| !self.loaded.contains_key(path.as_str()))
            .cloned()
            .collect();
        children.sort();
        children
    }

    /// Imports the longest registered prefix of `path` and walks the rest as attributes.
    pub fn resolve_attr_path(&mut self, path: &str) -> Result<Value, Error> {
        let segments: Vec<&str> = path.split('.').collect();
        for split in (1..=segments.len()).rev() {
            let module_path = segments[..split].join(".");
            if !self.is_registered(&module_path) {
                continue;
            }
            let module = self.import(&module_path)?;
            let mut current = Value::Object(module);
            for name in &segments[split..] {
                current = crate::runtime::exec::get_attribute(&current, name)?;
            }
            return Ok(current);
        }
        Err(Error::new(ErrorKind::ModuleNotFound).with_message(format!(
            "No module named '{}'",
            segments.first().copied().unwrap_or_default()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::ModuleRegistry;
    use crate::core::error::ErrorKind;
    use crate::core::object::{Module, Object};
    use crate::core::value::Value;

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        registry.register("pkg", || Module::new("pkg").with_attr("version", 3_i64));
        registry.register("pkg.sub", || Module::new("pkg.sub").with_attr("flag", true));
        registry
    }

    #[test]
    fn nested_import_attaches_child_to_parent() {
        let mut registry = registry();
        registry.import("pkg.sub").expect("import");
        let parent = registry.import("pkg").expect("parent");
        assert!(parent.get_attr("sub").is_some());
    }

    #[test]
    fn parent_import_shares_child_with_direct_import() {
        let mut registry = registry();
        let parent = registry.import("pkg").expect("parent");
        let attached = parent.get_attr("sub").expect("child attached");
        let direct = registry.import("pkg.sub").expect("child");
        assert_eq!(attached, Value::Object(direct));

        let mut fresh = self::registry();
        let direct = fresh.import("pkg.sub").expect("child first");
        let parent = fresh.import("pkg").expect("parent");
        assert_eq!(parent.get_attr("sub"), Some(Value::Object(direct)));
    }

    #[test]
    fn imports_are_cached() {
        let mut registry = registry();
        let first = registry.import("pkg").expect("first");
        let second = registry.import("pkg").expect("second");
        assert!(std::rc::Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn missing_segments_fail_with_module_not_found() {
        let mut registry = registry();
        let err = registry.import("nope.sub").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModuleNotFound);
        assert_eq!(err.message(), "No module named 'nope'");

        let err = registry.import("pkg.other").unwrap_err();
        assert_eq!(err.message(), "No module named 'pkg.other'");

        let orphan_err = {
            let mut registry = ModuleRegistry::new();
            registry.register("a.b", || Module::new("a.b"));
            registry.import("a.b").unwrap_err()
        };
        assert_eq!(orphan_err.message(), "No module named 'a'");
    }

    #[test]
    fn attr_paths_use_longest_registered_prefix() {
        let mut registry = registry();
        assert_eq!(
            registry.resolve_attr_path("pkg.sub.flag").expect("flag"),
            Value::Bool(true)
        );
        assert_eq!(
            registry.resolve_attr_path("pkg.version").expect("version"),
            Value::Int(3)
        );
        let err = registry.resolve_attr_path("pkg.missing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Attribute);
    }
}
