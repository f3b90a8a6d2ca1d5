//! Shared value types for VeriPort: configurations, instances, resources,
//! portfolios and the error taxonomy.

pub mod config;
pub mod error;
pub mod instance;
pub mod portfolio;
pub mod resources;

pub use config::*;
pub use error::*;
pub use instance::*;
pub use portfolio::*;
pub use resources::*;
