//! Tablemate - group matching service for shared dining experiences
//!
//! Participants submit a request ("submission") carrying category, group size
//! and gender preferences plus a location. The matching engine seats each
//! submission in the oldest compatible group with room, or founds a new one,
//! while honoring every rejection the participant has made.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{CompatibilityFilter, MatchError, MatchOutcome, Matcher};
pub use crate::models::{Group, GroupId, NewSubmission, Preference, Rejection, Submission, SubmissionId};
pub use crate::services::{MatchStore, MemoryStore, PostgresStore, StoreError};
