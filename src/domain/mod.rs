//! Pool-and-strategy domain logic, independent of any collaborator.

mod garden;
mod ids;
mod money;
mod policy;
mod strategy;

// Core domain types
pub use garden::{Garden, Member};
pub use ids::{AccountId, AssetId, GardenId, IntegrationId, StrategyId};
pub use money::{Amount, Fraction, Rate};
pub use policy::{GardenPolicy, ProfitSplit, Visibility};
pub use strategy::{
    FinalizeOutcome, Operation, OperationType, Strategy, StrategyParams, StrategyState, Vote,
};
