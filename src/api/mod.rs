//! Purpose: Define the public Rust API boundary for embedding the worker.
//! Exports: Worker construction, dispatch, transport, and the value/object model.
//! Role: Additive-only surface used by the binary, integration tests, and hosts.
//! Invariants: Hosts extend the worker through `ModuleRegistry` and `UnitLoader` only.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::config::WorkerConfig;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::handles::{HANDLE_PREFIX, HandleId, HandleStore};
pub use crate::core::object::{
    BoundArgs, CallArgs, FromValue, Module, NativeFunction, Object, ObjectRef, downcast,
};
pub use crate::core::value::Value;
pub use crate::dispatch::{Dispatcher, ReleaseReport, RequestHandler, TypePolicy};
pub use crate::protocol::{ErrorInfo, Request, Response, ResponseType};
pub use crate::runtime::classify::{Classification, RefDescriptor};
pub use crate::runtime::loader::{JsonUnitLoader, UnitLoader};
pub use crate::runtime::registry::ModuleRegistry;
pub use crate::transport::{ServeSummary, serve};
pub use crate::worker::Worker;
