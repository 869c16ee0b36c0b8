use axum::extract::{Path, Query, State};
use axum::Json;

use super::projections::{self, EntityResponse, ListResponse, ProjectionQuery};
use super::AppState;
use crate::domain::{Bounty, BountyKind, BountyPosted};
use crate::error::AppError;

pub async fn list_bounties(
    Query(params): Query<ProjectionQuery>,
    State(state): State<AppState>,
) -> Result<Json<ListResponse<BountyPosted, BountyKind>>, AppError> {
    projections::list::<Bounty>(params, state).await.map(Json)
}

pub async fn get_bounty(
    Path(id): Path<String>,
    Query(params): Query<ProjectionQuery>,
    State(state): State<AppState>,
) -> Result<Json<EntityResponse<BountyPosted, BountyKind>>, AppError> {
    projections::get_one::<Bounty>(id, params, state).await.map(Json)
}
