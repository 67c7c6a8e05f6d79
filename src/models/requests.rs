use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::domain::{
    Category, Gender, GroupSize, Location, NewSubmission, Preference, SubmissionId,
};

/// Request to register a submission
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSubmissionRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: String,
    #[serde(default = "any_preference")]
    pub category: Preference<Category>,
    #[serde(default = "any_preference", alias = "group_size", rename = "groupSize")]
    pub group_size: Preference<GroupSize>,
    #[serde(default = "any_preference", alias = "gender_preference", rename = "genderPreference")]
    pub gender_preference: Preference<Gender>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

fn any_preference<T>() -> Preference<T> {
    Preference::Any
}

impl From<CreateSubmissionRequest> for NewSubmission {
    fn from(req: CreateSubmissionRequest) -> Self {
        Self {
            id: SubmissionId::new(req.user_id),
            category: req.category,
            group_size: req.group_size,
            gender: req.gender_preference,
            location: Location::new(req.latitude, req.longitude),
        }
    }
}
