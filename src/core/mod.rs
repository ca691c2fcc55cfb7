// Core modules: value model, object protocol, handle table, and errors.
pub mod error;
pub mod handles;
pub mod object;
pub mod value;
