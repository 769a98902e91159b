//! skillforge-backends — grading backend integrations.
//!
//! Implements the `GradingBackend` trait for the remote reasoning service
//! and for an in-process mock, plus the configuration/factory layer that
//! assembles a backend from TOML.

pub mod config;
pub mod mock;
pub mod remote;

pub use config::{create_backend, load_config, BackendConfig, SkillforgeConfig};
pub use mock::{CannedAssessment, MockGrader};
pub use remote::RemoteGrader;
