//! Purpose: Library crate behind the `refworker` binary and its tests.
//! Exports: `api` (stable surface), plus the runtime, protocol and builtin modules.
//! Role: Keeps the binary thin; every protocol behavior is reachable in-process.
//! Invariants: All worker state is owned by a `Worker` value; there are no globals.
//! Invariants: Modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod builtins;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod protocol;
pub mod runtime;
pub mod transport;
pub mod worker;
