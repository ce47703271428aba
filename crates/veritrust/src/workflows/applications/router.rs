use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;

use super::domain::{ApplicationId, JobId, ProofArtifact, Role, Session};
use super::machine::{ApplicationStatus, TransitionRequest};
use super::repository::{ApplicationStore, JobDirectory};
use super::service::{ApplicationService, ApplicationServiceError};
use super::views::ApplicationView;

/// Header carrying the signed-in user id, as resolved by the identity provider.
pub const USER_HEADER: &str = "x-veritrust-user";
/// Header carrying the signed-in user's role (`candidate` or `company`).
pub const ROLE_HEADER: &str = "x-veritrust-role";

/// Router builder exposing HTTP endpoints for applying, reviewing and reading applications.
pub fn application_router<S, J>(service: Arc<ApplicationService<S, J>>) -> Router
where
    S: ApplicationStore + 'static,
    J: JobDirectory + 'static,
{
    Router::new()
        .route(
            "/api/v1/jobs/:job_id/applications",
            post(apply_handler::<S, J>),
        )
        .route("/api/v1/applications", get(list_handler::<S, J>))
        .route(
            "/api/v1/applications/:application_id",
            get(view_handler::<S, J>),
        )
        .route(
            "/api/v1/applications/:application_id/transitions",
            post(transition_handler::<S, J>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApplyBody {
    #[serde(default)]
    pub(crate) candidate_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionBody {
    pub(crate) status: ApplicationStatus,
    #[serde(default)]
    pub(crate) proof: Option<ProofArtifact>,
    #[serde(default)]
    pub(crate) confirmation: Option<String>,
}

/// Identity from request headers. Missing or malformed headers mean "not signed in".
pub(crate) fn session_from_headers(headers: &HeaderMap) -> Option<Session> {
    let user_id = headers
        .get(USER_HEADER)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|value| !value.is_empty())?;
    let role = headers
        .get(ROLE_HEADER)?
        .to_str()
        .ok()
        .and_then(Role::parse)?;

    Some(Session {
        user_id: user_id.to_string(),
        role,
    })
}

fn error_response(error: ApplicationServiceError) -> Response {
    AppError::from(error).into_response()
}

fn view_response(status: StatusCode, view: ApplicationView) -> Response {
    (status, axum::Json(view)).into_response()
}

pub(crate) async fn apply_handler<S, J>(
    State(service): State<Arc<ApplicationService<S, J>>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    body: Result<axum::Json<ApplyBody>, JsonRejection>,
) -> Response
where
    S: ApplicationStore + 'static,
    J: JobDirectory + 'static,
{
    let Some(session) = session_from_headers(&headers) else {
        return error_response(ApplicationServiceError::AuthRequired);
    };
    // The name is optional, so a request without a JSON body applies with defaults.
    let body = match body {
        Ok(axum::Json(body)) => body,
        Err(JsonRejection::MissingJsonContentType(_)) => ApplyBody::default(),
        Err(rejection) => return rejection.into_response(),
    };
    match service.apply(Some(&session), &JobId(job_id), &body.candidate_name) {
        Ok(record) => view_response(
            StatusCode::CREATED,
            ApplicationView::derive(&record, Role::Candidate),
        ),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn transition_handler<S, J>(
    State(service): State<Arc<ApplicationService<S, J>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    body: Result<axum::Json<TransitionBody>, JsonRejection>,
) -> Response
where
    S: ApplicationStore + 'static,
    J: JobDirectory + 'static,
{
    let Some(session) = session_from_headers(&headers) else {
        return error_response(ApplicationServiceError::AuthRequired);
    };
    let axum::Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection.into_response(),
    };
    let request = TransitionRequest {
        application_id: ApplicationId(application_id),
        requested: body.status,
        proof: body.proof,
        confirmation: body.confirmation,
    };

    match service.transition(Some(&session), request) {
        Ok(record) => view_response(
            StatusCode::OK,
            ApplicationView::derive(&record, session.role),
        ),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn view_handler<S, J>(
    State(service): State<Arc<ApplicationService<S, J>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: ApplicationStore + 'static,
    J: JobDirectory + 'static,
{
    let session = session_from_headers(&headers);
    match service.view(session.as_ref(), &ApplicationId(application_id)) {
        Ok(view) => view_response(StatusCode::OK, view),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_handler<S, J>(
    State(service): State<Arc<ApplicationService<S, J>>>,
    headers: HeaderMap,
) -> Response
where
    S: ApplicationStore + 'static,
    J: JobDirectory + 'static,
{
    let session = session_from_headers(&headers);
    match service.list_for(session.as_ref()) {
        Ok(views) => (
            StatusCode::OK,
            axum::Json(json!({ "applications": views })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}
