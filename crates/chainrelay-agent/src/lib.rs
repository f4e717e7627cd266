//! Chainrelay Agent - chat turn relay and session ownership

pub mod relay;
pub mod session;

pub use relay::{ChatRelay, TurnOutcome};
pub use session::SessionRegistry;
