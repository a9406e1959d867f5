use axum::Router;

use crate::state::SharedState;

pub mod caller;
/// Swagger UI and OpenAPI document.
pub mod docs;
/// Liveness check of the archive.
pub mod health;
/// Pack previews.
pub mod packs;
/// Room creation, listing, joining and deletion.
pub mod rooms;
/// Websocket upgrades for the lobby and rooms.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(packs::router())
        .merge(rooms::router())
        .merge(websocket::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
