//! Purpose: Resolution, invocation, and result classification for worker requests.
//! Exports: `classify`, `exec`, `loader`, `registry`, `resolve` modules.
pub mod classify;
pub mod exec;
pub mod loader;
pub mod registry;
pub mod resolve;
