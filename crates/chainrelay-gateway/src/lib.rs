//! Chainrelay Gateway - HTTP surface for the chat relay

pub mod server;

pub use server::{build_relay, router, start_gateway, AppState};
