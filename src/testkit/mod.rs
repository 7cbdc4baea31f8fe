//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`collaborators`] - In-memory [`PriceOracle`](crate::oracle::PriceOracle)
//!   and [`Exchange`](crate::exchange::Exchange) implementations:
//!   `StaticOracle`, `ConstantRateExchange`.
//! - [`world`] - Builders for engines, gardens, and strategy parameters
//!   so tests focus on assertions rather than construction boilerplate.

pub mod collaborators;
pub mod world;
