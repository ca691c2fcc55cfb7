//! Purpose: `os` and `os.path` capability modules.
//! Invariants: Path helpers operate lexically on `/`-separated strings; only `exists`,
//! `isfile`, `isdir` and `abspath` consult the process environment.
use std::path::{Component, MAIN_SEPARATOR_STR, Path, PathBuf};

use super::os_failure;
use crate::core::error::Error;
use crate::core::object::{Module, NativeFunction};
use crate::core::value::Value;

pub(crate) fn module() -> Module {
    Module::new("os")
        .with_attr("sep", MAIN_SEPARATOR_STR)
        .with_function(NativeFunction::new("os.getcwd", &[], |_| {
            current_dir().map(|dir| Value::Str(dir.display().to_string()))
        }))
        .with_function(NativeFunction::new("os.getenv", &["key", "default"], |args| {
            let key: String = args.required("key")?;
            match std::env::var(&key) {
                Ok(value) => Ok(Value::Str(value)),
                Err(_) => args.or("default", Value::None),
            }
        }))
        .with_function(NativeFunction::new("os.listdir", &["path"], |args| {
            let path: PathBuf = args.or("path", PathBuf::from("."))?;
            let entries = std::fs::read_dir(&path).map_err(|err| os_failure(err, &path))?;
            let mut names = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|err| os_failure(err, &path))?;
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
            names.sort();
            Ok(Value::List(names.into_iter().map(Value::Str).collect()))
        }))
}

pub(crate) fn path_module() -> Module {
    Module::new("os.path")
        .with_function(
            NativeFunction::new("os.path.join", &["path"], |args| {
                let mut joined: PathBuf = args.required("path")?;
                for (index, part) in args.rest().iter().enumerate() {
                    let Value::Str(part) = part else {
                        return Err(Error::type_error(format!(
                            "join() argument {} must be str, not {}",
                            index + 2,
                            part.type_name()
                        )));
                    };
                    joined.push(part);
                }
                Ok(Value::Str(joined.display().to_string()))
            })
            .variadic(),
        )
        .with_function(NativeFunction::new("os.path.exists", &["path"], |args| {
            Ok(Value::Bool(args.required::<PathBuf>("path")?.exists()))
        }))
        .with_function(NativeFunction::new("os.path.isfile", &["path"], |args| {
            Ok(Value::Bool(args.required::<PathBuf>("path")?.is_file()))
        }))
        .with_function(NativeFunction::new("os.path.isdir", &["path"], |args| {
            Ok(Value::Bool(args.required::<PathBuf>("path")?.is_dir()))
        }))
        .with_function(NativeFunction::new("os.path.basename", &["p"], |args| {
            let path: String = args.required("p")?;
            Ok(Value::str(split(&path).1))
        }))
        .with_function(NativeFunction::new("os.path.dirname", &["p"], |args| {
            let path: String = args.required("p")?;
            Ok(Value::str(split(&path).0))
        }))
        .with_function(NativeFunction::new("os.path.splitext", &["p"], |args| {
            let path: String = args.required("p")?;
            let (root, ext) = splitext(&path);
            Ok(Value::List(vec![Value::str(root), Value::str(ext)]))
        }))
        .with_function(NativeFunction::new("os.path.abspath", &["path"], |args| {
            let path: PathBuf = args.required("path")?;
            let absolute = if path.is_absolute() {
                path
            } else {
                current_dir()?.join(path)
            };
            Ok(Value::Str(normalize(&absolute).display().to_string()))
        }))
}

fn current_dir() -> Result<PathBuf, Error> {
    std::env::current_dir().map_err(|err| os_failure(err, Path::new(".")))
}

/// Splits into (head, tail) at the last separator; head keeps a lone leading `/`.
fn split(path: &str) -> (&str, &str) {
    let Some(index) = path.rfind('/') else {
        return ("", path);
    };
    let (head, tail) = (&path[..=index], &path[index + 1..]);
    let trimmed = head.trim_end_matches('/');
    if trimmed.is_empty() {
        (head, tail)
    } else {
        (trimmed, tail)
    }
}

/// Leading dots of the final component never start an extension.
fn splitext(path: &str) -> (&str, &str) {
    let name_start = path.rfind('/').map_or(0, |index| index + 1);
    let name = &path[name_start..];
    let stem_start = name.len() - name.trim_start_matches('.').len();
    match name.rfind('.') {
        Some(dot) if dot > stem_start => path.split_at(name_start + dot),
        _ => (path, ""),
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
