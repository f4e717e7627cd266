//! Agent definitions - declarative records handed to the managed runtime.
//!
//! Nothing here executes; the tree is serialized for deployment and used to
//! recognise agent names in the runner's event stream.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub const ORCHESTRATOR: &str = "GlobalOrchestrator";
pub const INVENTORY_SPECIALIST: &str = "InventorySpecialist";
pub const LOGISTICS_MANAGER: &str = "LogisticsManager";

const INVENTORY_INSTRUCTION: &str = "\
Analyze inventory levels.
1. Use 'search_products_by_context' or 'check_inventory_levels'.
2. ALWAYS format results as a clean Markdown table.
3. If there are many results, display only the TOP 10 most relevant ones.
4. At the end, state: 'There are additional records available. Would you like to see more?'";

const LOGISTICS_INSTRUCTION: &str = "\
Check shipment statuses.
1. Use 'track_shipment_status' or 'analyze_supply_chain_risk'.
2. ALWAYS format results as a clean Markdown table.
3. Limit initial output to the top 10 shipments.
4. Ask if the user needs the full manifest if more results exist.";

const ORCHESTRATOR_INSTRUCTION: &str = "\
You are the Global Supply Chain Brain. You are responsible for products, inventory and logistics.
You also have access to the memory tool, remember to include all the information that the tool can provide you with about the user before you respond.
1. Understand intent and delegate to specialists. As the Global Orchestrator, you have access to the full conversation history with the user.
When you transfer a query to a specialist agent, sub agent or tool, share the important facts and information from your memory to them so they can operate with the full context.
2. Ensure the final response is professional and uses Markdown tables for data.
3. If a specialist provides a long list, ensure only the top 10 items are shown initially.
4. Conclude with a brief, high-level executive summary of what the data implies.";

/// One parameter of a catalog tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// A callable tool published by the tool-catalog server.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolBinding {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

/// Tools an agent may be bound to.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentTool {
    Toolbox(ToolBinding),
    /// Runtime builtin that loads long-term memories before each turn.
    PreloadMemory,
}

impl AgentTool {
    pub fn name(&self) -> &str {
        match self {
            AgentTool::Toolbox(binding) => &binding.name,
            AgentTool::PreloadMemory => "preload_memory",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentDefinition {
    pub name: String,
    pub model: String,
    pub description: String,
    pub instruction: String,
    #[serde(default)]
    pub tools: Vec<AgentTool>,
    #[serde(default)]
    pub sub_agents: Vec<AgentDefinition>,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            description: String::new(),
            instruction: String::new(),
            tools: Vec::new(),
            sub_agents: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = AgentTool>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn sub_agent(mut self, agent: AgentDefinition) -> Self {
        self.sub_agents.push(agent);
        self
    }

    /// Names of this agent and every descendant, depth-first.
    pub fn names(&self) -> Vec<&str> {
        let mut out = vec![self.name.as_str()];
        for sub in &self.sub_agents {
            out.extend(sub.names());
        }
        out
    }

    pub fn find(&self, name: &str) -> Option<&AgentDefinition> {
        if self.name == name {
            return Some(self);
        }
        self.sub_agents.iter().find_map(|s| s.find(name))
    }

    /// Agent names must be unique across the tree; the runtime routes
    /// transfers by name.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for name in self.names() {
            if name.is_empty() {
                return Err(Error::ConfigError("agent with empty name".into()));
            }
            if !seen.insert(name) {
                return Err(Error::ConfigError(format!("duplicate agent name: {}", name)));
            }
        }
        Ok(())
    }
}

/// The supply-chain orchestrator tree: a root agent with memory preload that
/// delegates to an inventory and a logistics specialist.
pub fn supply_chain_tree(model: &str, toolset: &[ToolBinding]) -> AgentDefinition {
    let catalog = || toolset.iter().cloned().map(AgentTool::Toolbox);

    let inventory = AgentDefinition::new(INVENTORY_SPECIALIST, model)
        .description("Specialist in product stock and warehouse data.")
        .instruction(INVENTORY_INSTRUCTION)
        .tools(catalog());

    let logistics = AgentDefinition::new(LOGISTICS_MANAGER, model)
        .description("Expert in global shipping routes and logistics tracking.")
        .instruction(LOGISTICS_INSTRUCTION)
        .tools(catalog());

    AgentDefinition::new(ORCHESTRATOR, model)
        .description("Global Supply Chain Orchestrator root agent.")
        .instruction(ORCHESTRATOR_INSTRUCTION)
        .tools([AgentTool::PreloadMemory])
        .sub_agent(inventory)
        .sub_agent(logistics)
}
