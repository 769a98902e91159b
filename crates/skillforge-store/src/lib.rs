//! skillforge-store — document store implementations.
//!
//! Provides the in-memory `AggregateStore` used by tests and single-process
//! deployments, plus an in-memory `QuestionStore`. Any store whose writes
//! are atomic increments/merges with a compare-and-set idempotency mark can
//! replace these behind the core traits.

pub mod memory;
pub mod questions;

pub use memory::MemoryStore;
pub use questions::MemoryQuestionStore;
