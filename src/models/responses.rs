use serde::{Deserialize, Serialize};

use crate::models::domain::{Group, GroupId, Location, Rejection, Submission};

/// Response for the find-or-join endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindGroupResponse {
    pub group_id: GroupId,
    pub created: bool,
    pub member_count: usize,
    pub capacity: usize,
    pub centroid: Location,
    pub distance_km: f64,
}

/// Response for the reject endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectGroupResponse {
    pub submission_id: String,
    pub rejected: bool,
    pub message: String,
}

/// Group detail response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDetailResponse {
    #[serde(flatten)]
    pub group: Group,
    pub capacity: usize,
    pub is_full: bool,
}

impl From<Group> for GroupDetailResponse {
    fn from(group: Group) -> Self {
        Self {
            capacity: group.capacity(),
            is_full: group.is_full(),
            group,
        }
    }
}

/// Submission detail response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    #[serde(flatten)]
    pub submission: Submission,
    pub request_id: String,
}

/// Rejection history response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionsResponse {
    pub submission_id: String,
    pub rejections: Vec<Rejection>,
    pub count: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
