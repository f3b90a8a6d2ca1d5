//! Concurrent execution of a finished portfolio.
//!
//! Every member runs against the same instance at once; the first SAT/UNSAT
//! verdict cancels the rest.

pub mod log;
pub mod planner;
pub mod runtime;
pub mod shutdown;

pub use log::{ResultLog, ResultRow};
pub use planner::{PlannedMember, RunPlan, RunPlanner};
pub use runtime::{InstanceReport, MemberResult, PortfolioRunner, RunnerOptions};
pub use shutdown::{listen_for_signals, shutdown_signal, ShutdownLatch};
