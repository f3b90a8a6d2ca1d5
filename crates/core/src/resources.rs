//! CPU/GPU budgeting for portfolio members.

use crate::error::{PortfolioError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Snapshot of the hardware available to a tuning or run session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePool {
    pub cpus: usize,
    pub gpus: usize,
}

impl ResourcePool {
    pub fn new(cpus: usize, gpus: usize) -> Self {
        Self { cpus, gpus }
    }

    /// Every CPU the OS reports, no GPUs.
    pub fn detect_cpus() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self { cpus, gpus: 0 }
    }
}

/// Resources held by a portfolio member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceAllocation {
    /// Amounts only, not yet tied to concrete cores or devices.
    Counts { cpus: usize, gpus: usize },
    /// Inclusive CPU range plus an optional GPU index (`None` means no GPU).
    Bound {
        cpu_low: usize,
        cpu_high: usize,
        gpu: Option<usize>,
    },
}

impl ResourceAllocation {
    pub fn cpus(&self) -> usize {
        match *self {
            ResourceAllocation::Counts { cpus, .. } => cpus,
            ResourceAllocation::Bound {
                cpu_low, cpu_high, ..
            } => cpu_high + 1 - cpu_low,
        }
    }

    pub fn gpus(&self) -> usize {
        match *self {
            ResourceAllocation::Counts { gpus, .. } => gpus,
            ResourceAllocation::Bound { gpu, .. } => usize::from(gpu.is_some()),
        }
    }
}

/// Resource needs a tool declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub tool: String,
    /// Minimum CPUs the tool needs to be worth running.
    pub cpu_hint: usize,
    /// Number of GPUs the tool wants; anything above zero is granted one GPU.
    pub gpu_hint: usize,
}

impl ResourceSpec {
    pub fn new(tool: impl Into<String>, cpu_hint: usize, gpu_hint: usize) -> Self {
        Self {
            tool: tool.into(),
            cpu_hint,
            gpu_hint,
        }
    }

    pub fn needs_gpu(&self) -> bool {
        self.gpu_hint > 0
    }
}

/// Splits a [`ResourcePool`] across `slots` prospective portfolio members.
///
/// CPUs are split evenly; the first `cpus % slots` deductions receive one
/// extra CPU. Each tool that needs a GPU receives exactly one while any remain.
#[derive(Debug, Clone)]
pub struct ResourceTracker {
    specs: Vec<ResourceSpec>,
    slots: usize,
    cpu_per_slot: usize,
    cpu_remainder: usize,
    deductions: usize,
    remaining_cpu: usize,
    remaining_gpu: usize,
}

impl ResourceTracker {
    pub fn new(pool: ResourcePool, specs: Vec<ResourceSpec>, slots: usize) -> Result<Self> {
        let slots = slots.max(1);
        if pool.cpus < slots {
            return Err(PortfolioError::exhausted((slots, 0), (pool.cpus, pool.gpus)));
        }
        Ok(Self {
            specs,
            slots,
            cpu_per_slot: pool.cpus / slots,
            cpu_remainder: pool.cpus % slots,
            deductions: 0,
            remaining_cpu: pool.cpus,
            remaining_gpu: pool.gpus,
        })
    }

    pub fn remaining(&self) -> (usize, usize) {
        (self.remaining_cpu, self.remaining_gpu)
    }

    pub fn slots_left(&self) -> usize {
        self.slots - self.deductions
    }

    pub fn spec(&self, tool: &str) -> Option<&ResourceSpec> {
        self.specs.iter().find(|spec| spec.tool == tool)
    }

    /// CPUs the next deduction will receive.
    pub fn next_cpu_share(&self) -> usize {
        self.cpu_per_slot + usize::from(self.deductions < self.cpu_remainder)
    }

    fn request_for(&self, spec: &ResourceSpec) -> (usize, usize) {
        (self.next_cpu_share(), usize::from(spec.needs_gpu()))
    }

    fn fits(&self, spec: &ResourceSpec) -> bool {
        let (cpu, gpu) = self.request_for(spec);
        self.slots_left() > 0
            && spec.cpu_hint <= cpu
            && cpu <= self.remaining_cpu
            && gpu <= self.remaining_gpu
    }

    /// Tools whose resource spec still fits the remaining budget.
    pub fn get_possible(&self) -> Vec<String> {
        self.specs
            .iter()
            .filter(|spec| self.fits(spec))
            .map(|spec| spec.tool.clone())
            .collect()
    }

    /// Take `cpu`/`gpu` from the budget. With `mock` the result is computed
    /// but nothing is deducted. Fails without touching state on overflow.
    pub fn deduct(&mut self, cpu: usize, gpu: usize, mock: bool) -> Result<ResourceAllocation> {
        if self.slots_left() == 0 || cpu > self.remaining_cpu || gpu > self.remaining_gpu {
            return Err(PortfolioError::exhausted(
                (cpu, gpu),
                (self.remaining_cpu, self.remaining_gpu),
            ));
        }
        if !mock {
            self.remaining_cpu -= cpu;
            self.remaining_gpu -= gpu;
            self.deductions += 1;
            debug!(
                cpu,
                gpu,
                remaining_cpu = self.remaining_cpu,
                remaining_gpu = self.remaining_gpu,
                "deducted resources"
            );
        }
        Ok(ResourceAllocation::Counts { cpus: cpu, gpus: gpu })
    }

    /// Deduct the next slot's share for `tool` according to its spec.
    pub fn deduct_by_name(&mut self, tool: &str, mock: bool) -> Result<ResourceAllocation> {
        let spec = self
            .spec(tool)
            .cloned()
            .ok_or_else(|| PortfolioError::UnknownTool(tool.to_string()))?;
        let (cpu, gpu) = self.request_for(&spec);
        if spec.cpu_hint > cpu {
            return Err(PortfolioError::exhausted(
                (spec.cpu_hint, gpu),
                (self.remaining_cpu, self.remaining_gpu),
            ));
        }
        self.deduct(cpu, gpu, mock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs() -> Vec<ResourceSpec> {
        vec![
            ResourceSpec::new("nnenum", 1, 0),
            ResourceSpec::new("abcrown", 1, 1),
        ]
    }

    #[test]
    fn test_remainder_goes_to_first_deductions() {
        let mut tracker = ResourceTracker::new(ResourcePool::new(7, 0), specs(), 3).unwrap();
        let shares: Vec<usize> = (0..3)
            .map(|_| tracker.deduct_by_name("nnenum", false).unwrap().cpus())
            .collect();
        assert_eq!(shares, vec![3, 2, 2]);
        assert_eq!(tracker.remaining(), (0, 0));
    }

    #[test]
    fn test_deduct_beyond_budget_leaves_state_unchanged() {
        let mut tracker = ResourceTracker::new(ResourcePool::new(4, 1), specs(), 2).unwrap();
        let before = tracker.remaining();
        let err = tracker.deduct(5, 0, false).unwrap_err();
        assert!(matches!(err, PortfolioError::ResourceExhausted { .. }));
        assert_eq!(tracker.remaining(), before);

        let err = tracker.deduct(1, 2, false).unwrap_err();
        assert!(matches!(err, PortfolioError::ResourceExhausted { .. }));
        assert_eq!(tracker.remaining(), before);
        assert_eq!(tracker.slots_left(), 2);
    }

    #[test]
    fn test_mock_deduction_does_not_mutate() {
        let mut tracker = ResourceTracker::new(ResourcePool::new(4, 1), specs(), 2).unwrap();
        let preview = tracker.deduct_by_name("abcrown", true).unwrap();
        assert_eq!(preview, ResourceAllocation::Counts { cpus: 2, gpus: 1 });
        assert_eq!(tracker.remaining(), (4, 1));
        let committed = tracker.deduct_by_name("abcrown", false).unwrap();
        assert_eq!(committed, preview);
        assert_eq!(tracker.remaining(), (2, 0));
    }

    #[test]
    fn test_gpu_tools_excluded_once_gpus_exhausted() {
        let mut tracker = ResourceTracker::new(ResourcePool::new(4, 1), specs(), 3).unwrap();
        assert_eq!(tracker.get_possible(), vec!["nnenum", "abcrown"]);
        tracker.deduct_by_name("abcrown", false).unwrap();
        assert_eq!(tracker.get_possible(), vec!["nnenum"]);
        tracker.deduct_by_name("nnenum", false).unwrap();
        tracker.deduct_by_name("nnenum", false).unwrap();
        assert!(tracker.get_possible().is_empty());
    }

    #[test]
    fn test_cpu_hint_larger_than_share_does_not_fit() {
        let specs = vec![ResourceSpec::new("big", 4, 0), ResourceSpec::new("small", 1, 0)];
        let tracker = ResourceTracker::new(ResourcePool::new(4, 0), specs, 2).unwrap();
        assert_eq!(tracker.get_possible(), vec!["small"]);
    }

    #[test]
    fn test_pool_smaller_than_slots_is_rejected() {
        let err = ResourceTracker::new(ResourcePool::new(1, 0), specs(), 2).unwrap_err();
        assert!(matches!(err, PortfolioError::ResourceExhausted { .. }));
    }

    #[test]
    fn test_bound_allocation_counts() {
        let bound = ResourceAllocation::Bound {
            cpu_low: 4,
            cpu_high: 7,
            gpu: Some(0),
        };
        assert_eq!(bound.cpus(), 4);
        assert_eq!(bound.gpus(), 1);
    }
}
