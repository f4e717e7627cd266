//! Chainrelay Engine - REST adapters for the managed agent engine
//!
//! Runner, session store, memory bank, tool catalog, and the credentials
//! they share. None of these hold conversation logic; they translate between
//! the relay's types and the external services' wire shapes.

pub mod admin;
pub mod client;
pub mod credentials;
pub mod error;
pub mod events;
pub mod memory;
pub mod runner;
pub mod sessions;
pub mod toolbox;

pub use admin::EngineAdmin;
pub use client::EngineClient;
pub use credentials::TokenSource;
pub use error::{EngineError, EngineResult};
pub use events::{EventSchema, RunnerEvent};
pub use memory::{InMemoryMemoryService, MemoryRecord, MemoryService, VertexMemoryBankService};
pub use runner::{AgentEngineRunner, AgentRunner, RunnerStream};
pub use sessions::{InMemorySessionService, Session, SessionEvent, SessionService, VertexSessionService};
pub use toolbox::ToolboxClient;
