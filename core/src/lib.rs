//! # cdn-proxy core
//!
//! Lifecycle of the proxy deployment (identity, edge function, distribution)
//! and the bypass scanner.
//!
//! Every component talks to the cloud through the ports in [`provider`], so the
//! same code runs against AWS ([`provider::aws`]) and against the in-memory
//! provider used in tests.

pub mod distribution;
pub mod function;
pub mod identity;
pub mod orchestrator;
pub mod provider;
pub mod report;
pub mod retry;
pub mod scanner;
pub mod state;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use orchestrator::Orchestrator;
pub use scanner::BypassScanner;
pub use state::StateProbe;
