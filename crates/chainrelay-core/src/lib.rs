//! Chainrelay Core - Types, configuration, agent definitions, and error handling

pub mod agents;
pub mod config;
pub mod error;
pub mod narrative;
pub mod types;

pub use agents::{supply_chain_tree, AgentDefinition, AgentTool, ToolBinding, ToolParameter};
pub use config::{Backend, RelayConfig, DEFAULT_PORT, DEFAULT_USER_ID};
pub use error::{Error, Result};
pub use narrative::{TraceCollector, TraceEntry};
pub use types::*;
