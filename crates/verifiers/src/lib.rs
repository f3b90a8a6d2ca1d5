//! Verifier process contract and the built-in tool adapters.
//!
//! A [`VerifierTool`] describes how to launch one external verifier and how to
//! read its verdict; [`run_verifier`] does the launching under a timeout,
//! optional CPU/GPU pinning and cooperative cancellation.

pub mod process;
pub mod registry;
pub mod result;
pub mod tool;
pub mod tools;

pub use process::{run_verifier, validate_instance, CancelHandle, ProcessOptions};
pub use registry::ToolRegistry;
pub use result::{Outcome, VerifierResult};
pub use tool::{ArtifactExtensions, DynVerifierTool, RunCommand, ScopedContext, VerifierTool};
