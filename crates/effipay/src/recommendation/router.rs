use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::domain::{ErrorKind, RankingQuery, RecommendationRequest, UserId};
use super::repository::{OfferCatalog, ProfileStore};
use super::service::{RecommendationError, RecommendationService};

/// Router builder exposing the allocation and ranking endpoints.
pub fn recommendation_router<P, C>(service: Arc<RecommendationService<P, C>>) -> Router
where
    P: ProfileStore + 'static,
    C: OfferCatalog + 'static,
{
    Router::new()
        .route(
            "/api/v1/recommendations/allocation",
            post(allocation_handler::<P, C>),
        )
        .route(
            "/api/v1/recommendations/users/:user_id",
            get(ranking_handler::<P, C>),
        )
        .with_state(service)
}

pub(crate) async fn allocation_handler<P, C>(
    State(service): State<Arc<RecommendationService<P, C>>>,
    payload: Result<axum::Json<RecommendationRequest>, JsonRejection>,
) -> Response
where
    P: ProfileStore + 'static,
    C: OfferCatalog + 'static,
{
    let axum::Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return malformed_request(rejection.body_text()),
    };

    match service.recommend(request).await {
        Ok(allocation) => (StatusCode::OK, axum::Json(allocation)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn ranking_handler<P, C>(
    State(service): State<Arc<RecommendationService<P, C>>>,
    Path(user_id): Path<String>,
    query: Result<Query<RankingQuery>, QueryRejection>,
) -> Response
where
    P: ProfileStore + 'static,
    C: OfferCatalog + 'static,
{
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return malformed_request(rejection.body_text()),
    };

    match service.rank_instruments(UserId(user_id), query).await {
        Ok(ranking) => (StatusCode::OK, axum::Json(ranking)).into_response(),
        Err(error) => error.into_response(),
    }
}

fn malformed_request(detail: String) -> Response {
    let kind = ErrorKind::InvalidRequest;
    let payload = json!({
        "error": kind.code(),
        "detail": detail,
    });
    (kind.status(), axum::Json(payload)).into_response()
}

impl ErrorKind {
    pub const fn status(self) -> StatusCode {
        match self {
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::InvalidInstrument
            | ErrorKind::NoEligibleInstrument
            | ErrorKind::InsufficientCapacity => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::ConstraintViolation => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for RecommendationError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let mut payload = json!({
            "error": kind.code(),
            "detail": self.to_string(),
        });
        if let RecommendationError::InsufficientCapacity { shortfall, .. } = &self {
            payload["shortfall"] = json!(shortfall);
        }

        (kind.status(), axum::Json(payload)).into_response()
    }
}
