//! Transaction building and private submission
//!
//! - Intent: logical transfer to unsigned envelopes
//! - RPC: read-only chain access
//! - Simulation: dry run before sending
//! - Relay: Flashbots-style bundle submission and outcome tracking

pub mod intent;
pub mod relay;
pub mod rpc;
pub mod simulation;

pub use intent::{TransferIntentBuilder, TransferRequest, UnsignedEnvelope};
pub use relay::{BundleHandle, BundleOutcome, OutcomePolicy, PrivateRelayClient};
pub use rpc::{ChainClient, EthersChain};
pub use simulation::SimulationResult;
