//! Verdant - a community-governed investment pool engine.
//!
//! This crate implements the strategy lifecycle workflow of a
//! member-governed capital pool ("garden"): members propose time-bounded
//! investment strategies, vote on them, and authorized keepers execute
//! and later finalize them through pluggable integration adapters.
//!
//! # Architecture
//!
//! - **[`domain`]** - Pool and strategy domain types: gardens, policies,
//!   the strategy state machine
//!   (`Proposed → Resolved → Executed → Finalized`, with terminal
//!   `Rejected`/`Expired` branches).
//! - **[`integration`]** - The [`IntegrationAdapter`](integration::IntegrationAdapter)
//!   capability and registry, plus concrete adapters:
//!   - `LongShortPairAdapter` - collateralized long/short derivative pairs
//!     gated on expiry plus a delivered settlement price
//!   - `VaultAdapter` - interest-bearing vault deposits
//! - **[`controller`]** - Process-wide trust registry: keepers, approved
//!   integrations, gardens.
//! - **[`engine`]** - The orchestrator. Every public operation runs
//!   against a working copy of shared state and commits only on success,
//!   so adapter failures roll back atomically.
//! - **[`ledger`]**, **[`oracle`]**, **[`exchange`]** - External
//!   collaborators: balances and clock, pair prices, swaps.
//!
//! # Modules
//!
//! - [`config`] - Configuration loading from TOML files
//! - [`logging`] - Tracing subscriber setup
//! - [`error`] - Error taxonomy (policy, auth, timing, state, integration)
//! - [`testkit`] - Test builders and collaborator stubs (feature `testkit`)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use verdant::engine::Engine;
//! use verdant::integration::{IntegrationRegistry, VaultAdapter};
//!
//! let mut registry = IntegrationRegistry::new();
//! registry.register(Arc::new(VaultAdapter::new(Default::default())));
//! ```

pub mod config;
pub mod controller;
pub mod domain;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod integration;
pub mod ledger;
pub mod logging;
pub mod oracle;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
