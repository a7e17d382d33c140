use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::ApiError;
use crate::geo::Place;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<Place>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/location/search", get(search))
}

#[instrument(skip(state))]
async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = params.query.trim();
    if query.is_empty() {
        return Err(ApiError::Validation("query must not be empty".into()));
    }

    let results = state.geo.search(query).await?;
    Ok(Json(SearchResponse { results }))
}
