//! Purpose: The worker's request handler: resolve, execute, classify against owned state.
//! Exports: `Worker`.
//! Role: Owns the capability registry, handle store, and unit loader for one process.
//! Invariants: The handle store is only mutated by classification and release.
//! Invariants: Every failure returned from `call`/`get_attr` carries the step trace.
use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::builtins;
use crate::config::WorkerConfig;
use crate::core::error::Error;
use crate::core::handles::HandleStore;
use crate::core::object::CallArgs;
use crate::core::value::Value;
use crate::dispatch::{ReleaseReport, RequestHandler};
use crate::protocol::{AttrRequest, CallRequest};
use crate::runtime::classify::{Classification, DEFAULT_REPR_LIMIT, classify};
use crate::runtime::exec::{Trace, execute, get_attribute};
use crate::runtime::loader::{DEFAULT_UNIT_EXTENSION, JsonUnitLoader, UnitLoader};
use crate::runtime::registry::ModuleRegistry;
use crate::runtime::resolve::Resolver;

pub struct Worker {
    registry: ModuleRegistry,
    store: HandleStore,
    loader: Option<Box<dyn UnitLoader>>,
    unit_extension: String,
    repr_limit: usize,
}

impl Worker {
    /// A worker with the built-in capability modules and the JSON unit loader.
    pub fn new(config: &WorkerConfig) -> Self {
        let mut registry = ModuleRegistry::new();
        builtins::install(&mut registry);
        let loader: Option<Box<dyn UnitLoader>> = config.file_units.then(|| {
            Box::new(JsonUnitLoader::new().with_extension(config.unit_extension.clone()))
                as Box<dyn UnitLoader>
        });
        Self {
            registry,
            store: HandleStore::new(),
            loader,
            unit_extension: config.unit_extension.clone(),
            repr_limit: config.repr_limit,
        }
    }

    /// A worker over a caller-supplied registry with no unit loader.
    pub fn with_registry(registry: ModuleRegistry) -> Self {
        Self {
            registry,
            store: HandleStore::new(),
            loader: None,
            unit_extension: DEFAULT_UNIT_EXTENSION.to_string(),
            repr_limit: DEFAULT_REPR_LIMIT,
        }
    }

    pub fn with_loader(mut self, loader: impl UnitLoader + 'static) -> Self {
        self.unit_extension = loader.extension().to_string();
        self.loader = Some(Box::new(loader));
        self
    }

    pub fn store(&self) -> &HandleStore {
        &self.store
    }

    fn resolver(&mut self) -> Resolver<'_> {
        Resolver {
            registry: &mut self.registry,
            store: &self.store,
            loader: self.loader.as_deref(),
            unit_extension: &self.unit_extension,
        }
    }

    fn resolve_call(&mut self, request: CallRequest, trace: &mut Trace) -> Result<Value, Error> {
        let CallRequest {
            target,
            method,
            args,
            kwargs,
        } = request;
        trace.step(format!("resolve target '{target}'"));
        let mut resolver = self.resolver();
        let resolved = resolver.resolve(&target).map_err(|err| trace.fail(err))?;
        let args = call_args(&resolver, args, kwargs).map_err(|err| trace.fail(err))?;
        execute(
            &resolved,
            &format!("'{target}'"),
            method.as_deref(),
            args,
            trace,
        )
    }
}

fn call_args(
    resolver: &Resolver<'_>,
    args: Vec<JsonValue>,
    kwargs: Map<String, JsonValue>,
) -> Result<CallArgs, Error> {
    let positional = args
        .into_iter()
        .map(|arg| resolver.argument(arg))
        .collect::<Result<Vec<_>, _>>()?;
    let mut keyword = BTreeMap::new();
    for (key, value) in kwargs {
        keyword.insert(key, resolver.argument(value)?);
    }
    Ok(CallArgs::new(positional, keyword))
}

impl RequestHandler for Worker {
    fn call(&mut self, request: CallRequest) -> Result<Classification, Error> {
        let mut trace = Trace::new();
        let result = self.resolve_call(request, &mut trace)?;
        Ok(classify(result, &mut self.store, self.repr_limit))
    }

    fn get_attr(&mut self, request: AttrRequest) -> Result<Classification, Error> {
        let mut trace = Trace::new();
        trace.step(format!("resolve target '{}'", request.target));
        let resolved = self
            .resolver()
            .resolve(&request.target)
            .map_err(|err| trace.fail(err))?;
        trace.step(format!(
            "read attribute '{}' on '{}'",
            request.attr, request.target
        ));
        let value = get_attribute(&resolved, &request.attr).map_err(|err| trace.fail(err))?;
        Ok(classify(value, &mut self.store, self.repr_limit))
    }

    fn release(&mut self, refs: &[String]) -> ReleaseReport {
        let deleted: Vec<String> = refs
            .iter()
            .filter(|id| self.store.remove(id))
            .cloned()
            .collect();
        debug!(
            requested = refs.len(),
            deleted = deleted.len(),
            remaining = self.store.size(),
            "handles released"
        );
        ReleaseReport {
            deleted,
            remaining: self.store.size(),
        }
    }

    fn ref_count(&self) -> usize {
        self.store.size()
    }
}

#[cfg(test)]
mod tests {
    use super::Worker;
    use crate::builtins;
    use crate::builtins::io::StringIO;
    use crate::config::WorkerConfig;
    use crate::core::error::{Error, ErrorKind};
    use crate::core::object::{Module, downcast};
    use crate::dispatch::RequestHandler;
    use crate::protocol::{AttrRequest, CallRequest};
    use crate::runtime::classify::Classification;
    use crate::runtime::loader::UnitLoader;
    use crate::runtime::registry::ModuleRegistry;
    use serde_json::{Map, Value, json};
    use std::path::Path;

    /// `key=value` lines become string attributes.
    struct KeyValueLoader;

    impl UnitLoader for KeyValueLoader {
        fn extension(&self) -> &str {
            "kv"
        }

        fn load(
            &self,
            path: &Path,
            name: &str,
            _registry: &mut ModuleRegistry,
        ) -> Result<Module, Error> {
            let text = std::fs::read_to_string(path).map_err(|err| {
                Error::new(ErrorKind::InvalidUnit)
                    .with_message("unreadable unit")
                    .with_source(err)
            })?;
            let module = Module::from_file(name, path);
            for line in text.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    module.set_attr(key.trim(), value.trim());
                }
            }
            Ok(module)
        }
    }

    fn worker() -> Worker {
        Worker::new(&WorkerConfig::default())
    }

    fn call(target: &str, method: Option<&str>, args: Vec<Value>) -> CallRequest {
        CallRequest {
            target: target.to_string(),
            method: method.map(str::to_string),
            args,
            kwargs: Map::new(),
        }
    }

    fn handle(classification: Classification) -> String {
        match classification {
            Classification::Ref { id, .. } => id.to_string(),
            other => panic!("expected ref, got {other:?}"),
        }
    }

    #[test]
    fn sqrt_returns_inline_float() {
        let result = worker()
            .call(call("math", Some("sqrt"), vec![json!(16)]))
            .expect("call");
        assert_eq!(result, Classification::Value(json!(4.0)));
    }

    #[test]
    fn getattr_reads_through_handles() {
        let mut worker = worker();
        let buffer = handle(
            worker
                .call(call("io", Some("StringIO"), vec![json!("abc")]))
                .expect("StringIO"),
        );
        let closed = worker
            .get_attr(AttrRequest {
                target: buffer.clone(),
                attr: "closed".to_string(),
            })
            .expect("closed");
        assert_eq!(closed, Classification::Value(json!(false)));

        let err = worker
            .get_attr(AttrRequest {
                target: buffer,
                attr: "nope".to_string(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Attribute);
        assert_eq!(err.frames().len(), 2);
    }

    #[test]
    fn handle_arguments_are_substituted() {
        let mut worker = worker();
        let buffer = handle(
            worker
                .call(call("io", Some("StringIO"), vec![json!("hello")]))
                .expect("StringIO"),
        );
        let result = worker
            .call(call("builtins", Some("repr"), vec![json!({"__ref__": buffer})]))
            .expect("repr");
        assert!(matches!(result, Classification::Value(Value::String(_))));

        let size = worker
            .call(call(&buffer, Some("getvalue"), Vec::new()))
            .expect("getvalue");
        assert_eq!(size, Classification::Value(json!("hello")));
    }

    #[test]
    fn invocation_failures_keep_their_category_and_trace() {
        let mut worker = worker();
        let err = worker
            .call(call("math", Some("sqrt"), vec![json!(-1)]))
            .unwrap_err();
        assert_eq!(err.category(), "ValueError");
        assert_eq!(err.message(), "math domain error");
        assert_eq!(err.frames()[0], "resolve target 'math'");
        assert!(
            err.traceback()
                .trim_end()
                .ends_with("ValueError: math domain error")
        );
    }

    #[test]
    fn release_is_partial_and_counts_remaining() {
        let mut worker = worker();
        let first = handle(
            worker
                .call(call("io", Some("StringIO"), Vec::new()))
                .expect("first"),
        );
        worker
            .call(call("io", Some("StringIO"), Vec::new()))
            .expect("second");
        let report = worker.release(&[first.clone(), "ref:999999".to_string(), first]);
        assert_eq!(report.deleted, vec!["ref:000001".to_string()]);
        assert_eq!(report.remaining, 1);
        assert_eq!(worker.ref_count(), 1);
    }

    #[test]
    fn host_supplied_loaders_resolve_their_own_units() {
        let dir = tempfile::tempdir().expect("tempdir");
        let unit = dir.path().join("settings.kv");
        std::fs::write(&unit, "mode = fast\nlevel=3\n").expect("write unit");
        let target = unit.to_str().expect("utf8 path");

        let mut registry = ModuleRegistry::new();
        builtins::install(&mut registry);
        let mut worker = Worker::with_registry(registry).with_loader(KeyValueLoader);

        let mode = worker.call(call(target, Some("mode"), Vec::new())).expect("mode");
        assert_eq!(mode, Classification::Value(json!("fast")));
        let file = worker
            .get_attr(AttrRequest {
                target: target.to_string(),
                attr: "__file__".to_string(),
            })
            .expect("__file__");
        assert_eq!(file, Classification::Value(json!(target)));
        let imported = worker
            .call(call("settings", Some("level"), Vec::new()))
            .expect("recorded under stem");
        assert_eq!(imported, Classification::Value(json!("3")));

        let err = worker
            .call(call("settings.json", Some("mode"), Vec::new()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModuleNotFound);
    }

    #[test]
    fn registry_only_workers_have_no_unit_loader() {
        let mut registry = ModuleRegistry::new();
        registry.register("tools", || Module::new("tools").with_attr("answer", 42_i64));
        let mut worker = Worker::with_registry(registry);
        let answer = worker.call(call("tools", Some("answer"), Vec::new())).expect("answer");
        assert_eq!(answer, Classification::Value(json!(42)));
        let err = worker
            .call(call("./units.json", Some("x"), Vec::new()))
            .unwrap_err();
        assert!(err.message().contains("disabled"));
    }

    #[test]
    fn handle_descriptors_respect_the_repr_limit() {
        let config = WorkerConfig {
            repr_limit: 12,
            ..WorkerConfig::default()
        };
        let mut worker = Worker::new(&config);
        let result = worker
            .call(call("io", Some("StringIO"), vec![json!("some text")]))
            .expect("StringIO");
        let Classification::Ref { id, descriptor } = result else {
            panic!("expected a handle result");
        };
        assert_eq!(descriptor.type_name, "io.StringIO");
        assert_eq!(descriptor.repr, "<io.StringIO");
        assert_eq!(descriptor.repr.chars().count(), 12);

        let stored = worker.store().get(id.as_str()).expect("stored");
        assert!(downcast::<StringIO>(stored).is_some());
    }

    #[test]
    fn disabled_file_units_are_module_not_found() {
        let config = WorkerConfig {
            file_units: false,
            ..WorkerConfig::default()
        };
        let err = Worker::new(&config)
            .call(call("./helpers.json", Some("x"), Vec::new()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModuleNotFound);
    }
}
