//! skillforge-api — the service surface of the scoring engine.
//!
//! Exposes the grading endpoint, the aggregation trigger, and the mastery
//! read API as transport-agnostic handlers, plus in-process collaborator
//! implementations for local runs and tests.

pub mod collab;
pub mod service;
pub mod types;

pub use service::ScoringService;
pub use types::{AnswerEventChange, ErrorBody, GradeApiRequest, GradeApiResponse, HealthStatus};
