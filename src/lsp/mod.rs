//! Editor tooling: a language server for tab assembly sources.

pub mod backend;
pub mod settings;
pub mod tooling;

pub use backend::Backend;
