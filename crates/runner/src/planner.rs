//! Binding portfolio members to concrete CPU ranges and GPU indices.

use std::fmt;
use tracing::info;
use veriport_core::{
    Configuration, Portfolio, PortfolioError, ResourceAllocation, ResourcePool, Result,
};
use veriport_verifiers::{DynVerifierTool, ToolRegistry};

pub struct PlannedMember {
    pub tool: DynVerifierTool,
    pub configuration: Configuration,
    /// Always [`ResourceAllocation::Bound`].
    pub allocation: ResourceAllocation,
}

impl fmt::Debug for PlannedMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlannedMember")
            .field("tool", &self.tool.name())
            .field("configuration", &self.configuration)
            .field("allocation", &self.allocation)
            .finish()
    }
}

/// A portfolio whose members all hold disjoint hardware.
#[derive(Debug, Default)]
pub struct RunPlan {
    pub members: Vec<PlannedMember>,
}

impl RunPlan {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

pub struct RunPlanner {
    registry: ToolRegistry,
}

impl RunPlanner {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Carve CPU ranges greedily from the top of the pool and hand out GPU
    /// indices from 0 upward. Fails before anything runs if the pool is too
    /// small or a member names an unknown tool.
    ///
    /// Members are always rebound against `pool`: an existing
    /// [`ResourceAllocation::Bound`] only contributes its size, since the
    /// ranges it names may belong to a different machine.
    pub fn plan(&self, portfolio: &Portfolio, pool: ResourcePool) -> Result<RunPlan> {
        let mut cpu_top = pool.cpus;
        let mut next_gpu = 0;
        let mut members = Vec::with_capacity(portfolio.len());

        for member in portfolio.members() {
            let tool = self.registry.get(&member.tool)?;
            let cpus = member.allocation.cpus().max(1);
            let gpus = member.allocation.gpus();
            if cpus > cpu_top || next_gpu + gpus > pool.gpus {
                return Err(PortfolioError::exhausted(
                    (cpus, gpus),
                    (cpu_top, pool.gpus - next_gpu.min(pool.gpus)),
                ));
            }

            let allocation = ResourceAllocation::Bound {
                cpu_low: cpu_top - cpus,
                cpu_high: cpu_top - 1,
                gpu: (gpus > 0).then_some(next_gpu),
            };
            cpu_top -= cpus;
            next_gpu += gpus;

            info!(
                tool = %member.tool,
                config = %member.configuration,
                ?allocation,
                "bound portfolio member"
            );
            members.push(PlannedMember {
                tool,
                configuration: member.configuration.clone(),
                allocation,
            });
        }
        Ok(RunPlan { members })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veriport_core::ConfiguredVerifier;

    fn portfolio(members: &[(&str, usize, usize)]) -> Portfolio {
        let mut portfolio = Portfolio::new();
        for (idx, (tool, cpus, gpus)) in members.iter().enumerate() {
            portfolio.insert(ConfiguredVerifier::new(
                *tool,
                Configuration::empty(*tool).with("member", idx as i64),
                ResourceAllocation::Counts {
                    cpus: *cpus,
                    gpus: *gpus,
                },
            ));
        }
        portfolio
    }

    #[test]
    fn test_ranges_carved_from_the_top() {
        let planner = RunPlanner::new(ToolRegistry::with_default_tools());
        let plan = planner
            .plan(
                &portfolio(&[("abcrown", 2, 1), ("nnenum", 3, 0), ("mnbab", 1, 1)]),
                ResourcePool::new(8, 2),
            )
            .unwrap();

        let bound: Vec<_> = plan.members.iter().map(|m| m.allocation).collect();
        assert_eq!(
            bound,
            vec![
                ResourceAllocation::Bound { cpu_low: 6, cpu_high: 7, gpu: Some(0) },
                ResourceAllocation::Bound { cpu_low: 3, cpu_high: 5, gpu: None },
                ResourceAllocation::Bound { cpu_low: 2, cpu_high: 2, gpu: Some(1) },
            ]
        );
    }

    #[test]
    fn test_overflow_is_fatal() {
        let planner = RunPlanner::new(ToolRegistry::with_default_tools());
        let err = planner
            .plan(
                &portfolio(&[("nnenum", 3, 0), ("verinet", 2, 0)]),
                ResourcePool::new(4, 0),
            )
            .unwrap_err();
        assert!(matches!(err, PortfolioError::ResourceExhausted { .. }));

        let err = planner
            .plan(&portfolio(&[("abcrown", 1, 1)]), ResourcePool::new(4, 0))
            .unwrap_err();
        assert!(matches!(err, PortfolioError::ResourceExhausted { .. }));
    }

    #[test]
    fn test_bound_members_are_rebound_by_size() {
        let mut saved = Portfolio::new();
        saved.insert(ConfiguredVerifier::new(
            "nnenum",
            Configuration::empty("nnenum"),
            ResourceAllocation::Bound { cpu_low: 10, cpu_high: 12, gpu: Some(3) },
        ));
        let planner = RunPlanner::new(ToolRegistry::with_default_tools());
        let plan = planner.plan(&saved, ResourcePool::new(4, 1)).unwrap();
        assert_eq!(
            plan.members[0].allocation,
            ResourceAllocation::Bound { cpu_low: 1, cpu_high: 3, gpu: Some(0) }
        );
    }

    #[test]
    fn test_unknown_tool_is_rejected() {
        let planner = RunPlanner::new(ToolRegistry::new());
        let err = planner
            .plan(&portfolio(&[("marabou", 1, 0)]), ResourcePool::new(2, 0))
            .unwrap_err();
        assert!(matches!(err, PortfolioError::UnknownTool(name) if name == "marabou"));
    }
}
