//! Portfolio construction for VeriPort.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  Hydra          │────▶│  Optimizer       │────▶│  Evaluator      │
//! │  (pick/tune/add)│     │  (random search) │     │  (tool runs)    │
//! └─────────────────┘     └──────────────────┘     └─────────────────┘
//!          │
//!          ▼
//!   CostMatrix + IncumbentSet + ResourceTracker ──▶ Portfolio
//! ```
//!
//! # Key Components
//!
//! - [`optimizer::Optimizer`]: single-configuration black-box search contract
//! - [`hydra::HydraController`]: the iterative construction loop
//! - [`report::TuneReport`]: per-iteration record of a construction run

pub mod hydra;
pub mod optimizer;
pub mod report;

pub use hydra::{Evaluator, HydraController, HydraOutcome, HydraSettings, HydraState, ToolCandidate};
pub use optimizer::{CostFn, OptimizeOutput, OptimizeRequest, Optimizer, RandomSearchOptimizer};
pub use report::{IncumbentSummary, IterationRecord, StopReason, TuneReport};
