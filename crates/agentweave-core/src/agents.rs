use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An external persona an `agent` node can run as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub display_name: String,
    pub system_instruction: String,
}

/// Lookup of agent personas by id.
pub trait AgentRegistry: Send + Sync {
    fn lookup(&self, agent_id: &str) -> Option<AgentDefinition>;
}

/// In-memory registry, e.g. loaded from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct StaticAgentRegistry {
    agents: HashMap<String, AgentDefinition>,
}

impl StaticAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, agent: AgentDefinition) {
        self.agents.insert(agent.id.clone(), agent);
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl FromIterator<AgentDefinition> for StaticAgentRegistry {
    fn from_iter<I: IntoIterator<Item = AgentDefinition>>(iter: I) -> Self {
        let mut registry = Self::new();
        for agent in iter {
            registry.insert(agent);
        }
        registry
    }
}

impl AgentRegistry for StaticAgentRegistry {
    fn lookup(&self, agent_id: &str) -> Option<AgentDefinition> {
        self.agents.get(agent_id).cloned()
    }
}
