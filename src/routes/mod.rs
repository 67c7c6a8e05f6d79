// Route exports
pub mod matches;
pub mod submissions;

use actix_web::{web, HttpResponse};
use tokio_util::sync::CancellationToken;

use crate::core::MatchError;
use crate::models::ErrorResponse;

pub use matches::AppState;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(matches::configure)
            .configure(submissions::configure),
    );
}

/// Token cancelled when the handler future is dropped (client went away)
pub(crate) fn request_token() -> (CancellationToken, tokio_util::sync::DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

/// Map an engine error to its JSON response
pub(crate) fn error_response(context: &str, err: MatchError) -> HttpResponse {
    let body = |error: &str, status_code: u16| ErrorResponse {
        error: error.to_string(),
        message: err.to_string(),
        status_code,
    };

    match &err {
        MatchError::NotFound(_) => HttpResponse::NotFound().json(body("Not found", 404)),
        MatchError::Conflict(_) => HttpResponse::Conflict().json(body("Conflict", 409)),
        MatchError::Persistence(_) | MatchError::Cancelled | MatchError::TimedOut => {
            tracing::error!("{} failed: {}", context, err);
            HttpResponse::ServiceUnavailable()
                .insert_header(("Retry-After", "1"))
                .json(body(context, 503))
        }
        MatchError::CapacityConflict { .. } => {
            tracing::error!("{} leaked a capacity conflict: {}", context, err);
            HttpResponse::InternalServerError().json(body(context, 500))
        }
    }
}
