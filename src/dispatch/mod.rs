//! Request dispatch: planning, the attempt cascade, and its collaborators.

mod builder;
mod collaborators;
mod context;
mod executor;
mod plan;
mod stats;

pub use builder::DispatcherBuilder;
pub use collaborators::{
    AttemptRecord, AuditSink, DEFAULT_COLLABORATOR_TIMEOUT, DispatchAuditEvent, LatencyAlerter,
    LatencyObservation, SinkError, ThresholdAlerter, TracingAuditSink,
};
pub use context::{AttemptContext, DispatchOptions};
pub use executor::Dispatcher;
pub use plan::{AttemptPlan, AttemptTarget, SelectionPath};
pub use stats::{DispatchStats, ProviderStatus};
