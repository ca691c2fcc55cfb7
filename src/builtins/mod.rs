//! Purpose: Native capability modules installed into every worker's registry.
//! Exports: `install`, `base`, `io`.
//! Role: The fixed set of importable namespaces; unit files may bind into these.
use std::path::Path;

use crate::core::error::Error;
use crate::core::value::Value;
use crate::runtime::registry::ModuleRegistry;

pub mod base;
pub mod io;
mod json;
mod math;
mod operator;
mod os;
mod time;

/// Registers every built-in module under its dotted path.
pub fn install(registry: &mut ModuleRegistry) {
    registry.register("builtins", base::module);
    registry.register("math", math::module);
    registry.register("operator", operator::module);
    registry.register("json", json::module);
    registry.register("io", io::module);
    registry.register("os", os::module);
    registry.register("os.path", os::path_module);
    registry.register("time", time::module);
}

/// Maps an I/O failure on `path` to the matching OS error category.
pub(crate) fn os_failure(err: std::io::Error, path: &Path) -> Error {
    let category = match err.kind() {
        std::io::ErrorKind::NotFound => "FileNotFoundError",
        std::io::ErrorKind::PermissionDenied => "PermissionError",
        std::io::ErrorKind::AlreadyExists => "FileExistsError",
        std::io::ErrorKind::IsADirectory => "IsADirectoryError",
        std::io::ErrorKind::NotADirectory => "NotADirectoryError",
        _ => "OSError",
    };
    let message = format!(
        "{err}: {}",
        Value::str(path.display().to_string()).repr()
    );
    Error::raised(category)
        .with_message(message)
        .with_path(path)
        .with_source(err)
}
