//! plflux: a procedural-language handler that runs stored procedures written
//! in a small scripting language inside a database-like host.

pub mod bridge;
pub mod bytecode;
pub mod cache;
pub mod config;
pub mod engine;
pub mod handler;
pub mod host;
pub mod runtime;
pub mod syntax;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use engine::Engine;
