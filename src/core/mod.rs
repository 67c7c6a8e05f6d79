// Core algorithm exports
pub mod distance;
pub mod error;
pub mod filters;
pub mod matcher;

pub use distance::haversine_distance;
pub use error::MatchError;
pub use filters::{compatible_candidates, is_eligible, CompatibilityFilter};
pub use matcher::{MatchOutcome, Matcher};
