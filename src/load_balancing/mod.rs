pub mod balancer;
pub mod strategies;

pub use balancer::{BalancingStrategy, StrategyKind};
pub use strategies::{RoundRobin, WeightedRoundRobin};
