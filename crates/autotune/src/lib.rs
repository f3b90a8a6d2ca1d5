//! Cost bookkeeping for portfolio tuning.

pub mod cost_matrix;
pub mod history;
pub mod incumbents;

pub use cost_matrix::*;
pub use history::*;
pub use incumbents::*;
