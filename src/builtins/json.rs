//! Purpose: `json` capability module backed by serde_json.
//! Invariants: Object keys are always emitted in sorted order.
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::core::error::{Error, ErrorKind};
use crate::core::object::{Module, NativeFunction};
use crate::core::value::{EncodeError, Value};

pub(crate) fn module() -> Module {
    Module::new("json")
        .with_function(NativeFunction::new(
            "json.dumps",
            &["obj", "indent", "sort_keys"],
            |args| {
                let value: Value = args.or("obj", Value::None)?;
                let indent: Option<i64> = args.optional("indent")?;
                // Dict keys are ordered, so sort_keys only needs to be accepted.
                let _sort_keys: bool = args.or("sort_keys", false)?;
                dumps(&value, indent).map(Value::Str)
            },
        ))
        .with_function(NativeFunction::new("json.loads", &["s"], |args| {
            let text: String = args.required("s")?;
            serde_json::from_str::<serde_json::Value>(&text)
                .map(Value::from_wire)
                .map_err(|err| Error::raised("JSONDecodeError").with_message(err.to_string()))
        }))
}

fn dumps(value: &Value, indent: Option<i64>) -> Result<String, Error> {
    let wire = value.to_wire().map_err(|err| match err {
        EncodeError::NonFinite => {
            Error::value_error("Out of range float values are not JSON compliant")
        }
        EncodeError::Opaque(type_name) => Error::type_error(format!(
            "Object of type {type_name} is not JSON serializable"
        )),
    })?;
    let encode_failure = |err: serde_json::Error| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode JSON")
            .with_source(err)
    };
    let compact = serde_json::to_string(&wire).map_err(encode_failure)?;
    let Some(width) = indent else {
        return Ok(compact);
    };
    let width = usize::try_from(width).unwrap_or(0);
    let capacity = pretty_capacity(&wire, compact.len(), width).ok_or_else(too_large)?;
    let mut pad = String::new();
    pad.try_reserve_exact(width).map_err(|_| too_large())?;
    pad.extend(std::iter::repeat_n(' ', width));
    let mut out = Vec::new();
    out.try_reserve_exact(capacity).map_err(|_| too_large())?;
    let mut serializer =
        Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(pad.as_bytes()));
    wire.serialize(&mut serializer).map_err(encode_failure)?;
    String::from_utf8(out).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("encoded JSON is not UTF-8")
            .with_source(err)
    })
}

fn too_large() -> Error {
    Error::raised("MemoryError").with_message("indented JSON output is too large")
}

/// Upper bound on indented output: every node and closing bracket on its own line,
/// each padded to the deepest nesting level.
fn pretty_capacity(wire: &serde_json::Value, compact_len: usize, width: usize) -> Option<usize> {
    let (nodes, depth) = shape(wire);
    let per_line = depth.checked_mul(width)?.checked_add(3)?;
    nodes.checked_mul(2)?.checked_mul(per_line)?.checked_add(compact_len)
}

/// (node count, nesting depth)
fn shape(wire: &serde_json::Value) -> (usize, usize) {
    let children: Box<dyn Iterator<Item = &serde_json::Value>> = match wire {
        serde_json::Value::Array(items) => Box::new(items.iter()),
        serde_json::Value::Object(map) => Box::new(map.values()),
        _ => return (1, 0),
    };
    children.fold((1, 1), |(nodes, depth), child| {
        let (child_nodes, child_depth) = shape(child);
        (nodes.saturating_add(child_nodes), depth.max(child_depth + 1))
    })
}
