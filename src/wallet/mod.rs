//! Accounts and signing
//!
//! ```text
//! environment → Credentials (funding + source) → TransactionSigner
//! ```
//!
//! # Security
//!
//! Private keys are read from the environment only and never printed:
//! errors name the role, `Debug` shows the address.

pub mod credentials;
pub mod signer;

pub use credentials::{Account, AccountRole, Credentials};
pub use signer::{SignedTransaction, TransactionSigner};
