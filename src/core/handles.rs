//! Purpose: Own every worker-resident value that was handed to the host by handle.
//! Exports: `HandleStore`, `HandleId`, `HANDLE_PREFIX`.
//! Role: The only mutable table shared between requests; threaded by `&mut`, never global.
//! Invariants: Ids are minted from a strictly increasing counter and never reused.
//! Invariants: Entries leave the store only through `remove`.
//! Invariants: Id text is `ref:` plus a zero-padded six-digit counter (wider past 999999).
use std::collections::HashMap;
use std::fmt;

use super::error::{Error, ErrorKind};
use super::value::Value;

pub const HANDLE_PREFIX: &str = "ref:";
const COUNTER_WIDTH: usize = 6;

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct HandleId(String);

impl HandleId {
    fn mint(counter: u64) -> Self {
        Self(format!("{HANDLE_PREFIX}{counter:0COUNTER_WIDTH$}"))
    }

    /// Accepts `ref:` followed by one or more ASCII digits.
    pub fn parse(text: &str) -> Option<Self> {
        let digits = text.strip_prefix(HANDLE_PREFIX)?;
        if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        Some(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default)]
pub struct HandleStore {
    entries: HashMap<HandleId, Value>,
    counter: u64,
}

impl HandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, value: Value) -> HandleId {
        self.counter += 1;
        let id = HandleId::mint(self.counter);
        self.entries.insert(id.clone(), value);
        tracing::trace!(handle = %id, size = self.entries.len(), "handle stored");
        id
    }

    pub fn get(&self, id: &str) -> Result<&Value, Error> {
        HandleId::parse(id)
            .and_then(|id| self.entries.get(&id))
            .ok_or_else(|| {
                Error::new(ErrorKind::UnknownReference)
                    .with_message(format!("Unknown object reference: {id}"))
            })
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let Some(id) = HandleId::parse(id) else {
            return false;
        };
        let removed = self.entries.remove(&id).is_some();
        if removed {
            tracing::trace!(handle = %id, size = self.entries.len(), "handle released");
        }
        removed
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
