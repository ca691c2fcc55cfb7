//! Purpose: Decide whether a result travels inline or stays resident behind a handle.
//! Exports: `Classification`, `classify`, `RefDescriptor`.
//! Role: Result Classifier; the only writer to the handle store besides release.
//! Invariants: Never fails; any encode failure falls through to the handle path.
//! Invariants: Exactly one handle is minted per `Classification::Ref`.
use serde_json::{Value as JsonValue, json};

use crate::core::handles::{HandleId, HandleStore};
use crate::core::value::Value;

pub const DEFAULT_REPR_LIMIT: usize = 200;

#[derive(Clone, Debug, PartialEq)]
pub struct RefDescriptor {
    pub type_name: String,
    pub repr: String,
}

impl RefDescriptor {
    pub fn to_json(&self) -> JsonValue {
        json!({
            "__type__": self.type_name,
            "__repr__": self.repr,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Classification {
    None,
    Value(JsonValue),
    Ref { id: HandleId, descriptor: RefDescriptor },
}

pub fn classify(value: Value, store: &mut HandleStore, repr_limit: usize) -> Classification {
    if value.is_none() {
        return Classification::None;
    }
    match value.to_wire() {
        Ok(encoded) => Classification::Value(encoded),
        Err(reason) => {
            let descriptor = RefDescriptor {
                type_name: value.qualified_type_name(),
                repr: truncate_chars(&value.repr(), repr_limit),
            };
            let id = store.put(value);
            tracing::debug!(handle = %id, type_name = %descriptor.type_name, %reason, "result kept by handle");
            Classification::Ref { id, descriptor }
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
