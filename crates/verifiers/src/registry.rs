//! Verifier registry for lookup by tool name.

use crate::tool::{DynVerifierTool, VerifierTool};
use crate::tools::{AbCrown, MnBab, Nnenum, OvalBab, VeriNet};
use std::sync::Arc;
use veriport_core::{PortfolioError, ResourceSpec, Result};

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<DynVerifierTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        registry.register(AbCrown);
        registry.register(Nnenum);
        registry.register(MnBab);
        registry.register(OvalBab);
        registry.register(VeriNet);
        registry
    }

    /// Register `tool`, replacing any adapter with the same name.
    pub fn register<T>(&mut self, tool: T)
    where
        T: VerifierTool + 'static,
    {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: DynVerifierTool) {
        self.tools.retain(|existing| existing.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[DynVerifierTool] {
        &self.tools
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name().to_string()).collect()
    }

    pub fn find(&self, name: &str) -> Option<DynVerifierTool> {
        self.tools
            .iter()
            .find(|tool| tool.name() == name)
            .map(Arc::clone)
    }

    pub fn get(&self, name: &str) -> Result<DynVerifierTool> {
        self.find(name)
            .ok_or_else(|| PortfolioError::UnknownTool(name.to_string()))
    }

    /// Resource specs for `names`, in the given order.
    pub fn resource_specs(&self, names: &[String]) -> Result<Vec<ResourceSpec>> {
        names
            .iter()
            .map(|name| self.get(name).map(|tool| tool.resources()))
            .collect()
    }
}
