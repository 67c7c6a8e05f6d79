use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;

use super::{error_response, request_token};
use crate::core::Matcher;
use crate::models::{FindGroupResponse, HealthResponse, RejectGroupResponse, SubmissionId};
use crate::services::PostgresStore;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub matcher: Matcher,
    /// Present when the Postgres backend is in use, for health checks
    pub postgres: Option<Arc<PostgresStore>>,
}

/// Configure all match-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/matches/find/{id}", web::post().to(find_group))
        .route("/matches/reject/{id}", web::post().to(reject_group));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let healthy = match &state.postgres {
        Some(postgres) => postgres.health_check().await.unwrap_or(false),
        None => true,
    };

    let status = if healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Find or join a group
///
/// POST /api/v1/matches/find/{id}
async fn find_group(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = SubmissionId::new(path.into_inner());
    let (token, _guard) = request_token();

    tracing::info!("Finding group for submission: {}", id);

    match state.matcher.find_or_join_group(&id, &token).await {
        Ok(outcome) => {
            let group = outcome.group;
            HttpResponse::Ok().json(FindGroupResponse {
                group_id: group.id,
                created: outcome.created,
                member_count: group.members.len(),
                capacity: group.capacity(),
                centroid: group.centroid,
                distance_km: outcome.distance_km,
            })
        }
        Err(e) => error_response("Failed to find group", e),
    }
}

/// Reject the submission's current group
///
/// POST /api/v1/matches/reject/{id}
async fn reject_group(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = SubmissionId::new(path.into_inner());
    let (token, _guard) = request_token();

    match state.matcher.reject_group(&id, &token).await {
        Ok(rejected) => {
            let message = if rejected {
                format!("Group for submission {} successfully rejected.", id)
            } else {
                format!("Submission {} has no group to reject.", id)
            };
            HttpResponse::Ok().json(RejectGroupResponse {
                submission_id: id.to_string(),
                rejected,
                message,
            })
        }
        Err(e) => error_response("Failed to reject group", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryStore;
    use actix_web::{http::StatusCode, test, App};

    fn memory_state() -> AppState {
        AppState {
            matcher: Matcher::with_default_settings(Arc::new(MemoryStore::new())),
            postgres: None,
        }
    }

    #[actix_web::test]
    async fn test_health_without_postgres() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(memory_state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let body: HealthResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.status, "healthy");
    }

    #[actix_web::test]
    async fn test_find_unknown_submission_is_404() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(memory_state()))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/v1/matches/find/nobody").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
