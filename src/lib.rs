//! Token Rescue Library
//!
//! Moves ERC-20 tokens out of a compromised account through a private relay
//! bundle, with gas paid by a separate safe account.

pub mod abi;
pub mod cli;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod trading;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use orchestrator::{RunStatus, TransferOrchestrator, TransferReport};
