use actix_web::{web, HttpResponse, Responder};
use validator::Validate;

use super::{error_response, request_token, AppState};
use crate::models::{
    CreateSubmissionRequest, ErrorResponse, GroupDetailResponse, GroupId, NewSubmission,
    RejectionsResponse, SubmissionId, SubmissionResponse,
};

/// Configure submission and group lookup routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/submissions", web::post().to(create_submission))
        .route("/submissions/{id}", web::get().to(get_submission))
        .route("/submissions/{id}/rejections", web::get().to(get_rejections))
        .route("/groups/{id}", web::get().to(get_group));
}

/// Register a submission
///
/// POST /api/v1/submissions
///
/// Request body:
/// ```json
/// {
///   "userId": "string",
///   "category": "sushi|mexican|...|any",
///   "groupSize": "small|large|any",
///   "genderPreference": "male|female|any",
///   "latitude": 0.0,
///   "longitude": 0.0
/// }
/// ```
async fn create_submission(
    state: web::Data<AppState>,
    req: web::Json<CreateSubmissionRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for create_submission request: {:?}", errors);
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: errors.to_string(),
            status_code: 400,
        });
    }

    let (token, _guard) = request_token();
    let new = NewSubmission::from(req.into_inner());

    match state.matcher.register_submission(new, &token).await {
        Ok(submission) => HttpResponse::Ok().json(SubmissionResponse {
            submission,
            request_id: uuid::Uuid::new_v4().to_string(),
        }),
        Err(e) => error_response("Failed to create submission", e),
    }
}

/// GET /api/v1/submissions/{id}
async fn get_submission(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = SubmissionId::new(path.into_inner());
    let (token, _guard) = request_token();

    match state.matcher.submission(&id, &token).await {
        Ok(submission) => HttpResponse::Ok().json(SubmissionResponse {
            submission,
            request_id: uuid::Uuid::new_v4().to_string(),
        }),
        Err(e) => error_response("Failed to fetch submission", e),
    }
}

/// GET /api/v1/submissions/{id}/rejections
async fn get_rejections(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = SubmissionId::new(path.into_inner());
    let (token, _guard) = request_token();

    match state.matcher.rejections(&id, &token).await {
        Ok(rejections) => HttpResponse::Ok().json(RejectionsResponse {
            submission_id: id.to_string(),
            count: rejections.len(),
            rejections,
        }),
        Err(e) => error_response("Failed to fetch rejections", e),
    }
}

/// GET /api/v1/groups/{id}
async fn get_group(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    let id = GroupId(path.into_inner());
    let (token, _guard) = request_token();

    match state.matcher.group_detail(id, &token).await {
        Ok(group) => HttpResponse::Ok().json(GroupDetailResponse::from(group)),
        Err(e) => error_response("Failed to fetch group", e),
    }
}
