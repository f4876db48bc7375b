pub mod classify;
pub mod deposits;
pub mod engine;
pub mod prefilter;
pub mod withdrawals;

pub use engine::{BatchOutcome, BatchReport, SingleBlockOutcome, SyncEngine};
