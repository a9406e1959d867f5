use axum::{Json, Router, extract::State, routing::get};

use crate::{
    error::{AppError, ServiceError},
    state::{SharedState, pack::PackPreview},
};

/// Packs a room can be created from.
pub fn router() -> Router<SharedState> {
    Router::new().route("/packs", get(list_packs))
}

/// Previews of every loaded question pack.
#[utoipa::path(
    get,
    path = "/packs",
    tag = "packs",
    responses((status = 200, description = "Available packs", body = [PackPreview]))
)]
pub async fn list_packs(
    State(state): State<SharedState>,
) -> Result<Json<Vec<PackPreview>>, AppError> {
    let packs = state.packs().list().await.map_err(ServiceError::from)?;
    Ok(Json(packs))
}
