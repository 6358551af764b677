//! Certwarden common types
//!
//! Shared by the configuration crate and the orchestrator:
//!
//! - [`Subject`]: validated, normalized domain names
//! - [`Clock`]: wall-clock source shared by every budget operation
//! - [`budget`]: leaky-bucket arithmetic applied by all budget stores

pub mod budget;
pub mod clock;
pub mod ids;

pub use budget::{
    BucketState, BudgetSnapshot, ConsumeOutcome, LeakyBucketPolicy, DEFAULT_BUDGET_KEY,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::{Subject, SubjectError};
