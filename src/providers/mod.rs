//! Provider table, model/pricing catalogue, load accounting and scoring.

mod catalog;
mod load;
mod selector;

pub use catalog::{DEFAULT_BASE_UNIT_COST, ModelTable, PricingTable};
pub use load::{ActiveLoad, LoadGuard};
pub use selector::{
    FALLBACK_LATENCY_MS, FALLBACK_RELIABILITY, LATENCY_CEILING_MS, LATENCY_FLOOR_MS, LOAD_WEIGHT,
    MAX_ALTERNATIVES, PREFERENCE_BONUS, PRIORITY_WEIGHT, ProviderSelector,
};
