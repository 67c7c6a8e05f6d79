// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    capacity, Category, Gender, Group, GroupId, GroupSize, Location, NewGroup, NewSubmission, Preference,
    Rejection, Submission, SubmissionId,
};
pub use requests::CreateSubmissionRequest;
pub use responses::{
    ErrorResponse, FindGroupResponse, GroupDetailResponse, HealthResponse, RejectGroupResponse,
    RejectionsResponse, SubmissionResponse,
};
