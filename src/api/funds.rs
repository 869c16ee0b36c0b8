use axum::extract::{Path, Query, State};
use axum::Json;

use super::projections::{self, EntityResponse, ListResponse, ProjectionQuery};
use super::AppState;
use crate::domain::{FundCreated, FundKind, StudyFund};
use crate::error::AppError;

pub async fn list_funds(
    Query(params): Query<ProjectionQuery>,
    State(state): State<AppState>,
) -> Result<Json<ListResponse<FundCreated, FundKind>>, AppError> {
    projections::list::<StudyFund>(params, state).await.map(Json)
}

pub async fn get_fund(
    Path(id): Path<String>,
    Query(params): Query<ProjectionQuery>,
    State(state): State<AppState>,
) -> Result<Json<EntityResponse<FundCreated, FundKind>>, AppError> {
    projections::get_one::<StudyFund>(id, params, state).await.map(Json)
}
