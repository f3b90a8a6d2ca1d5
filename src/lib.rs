//! VeriPort facade: configuration files, tune/run sessions and the CLI.

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod session;

#[cfg(feature = "cli")]
pub use cli::*;
pub use config::*;
pub use session::*;

