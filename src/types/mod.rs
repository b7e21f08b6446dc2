//! Public data types: request policies, samples and selection output.

mod decision;
mod policy;
mod sample;

pub use decision::{LoadBalancingDecision, ScoreBreakdown, ScoredCandidate};
pub use policy::{ModelType, RequestPolicy, SelectionPreferences};
pub(crate) use sample::AggregateBuilder;
pub use sample::{PerformanceSample, ProviderAggregate};
