//! Server module for vmrelay
//!
//! Contains the proxy server initialization and runtime logic.
//!
//! # Module Structure
//!
//! - `config`: Configuration structures for the server and the console
//! - `loader`: Configuration loading from files and environment
//! - `validation`: Production configuration checks
//! - `init`: Router assembly and the run loop

pub mod config;
mod init;
mod loader;
mod validation;

// Re-export public API
pub use init::run;
pub use loader::load_config;
