use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the room API.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::packs::list_packs,
        crate::routes::rooms::list_rooms,
        crate::routes::rooms::create_room,
        crate::routes::rooms::archived_rooms,
        crate::routes::rooms::get_room,
        crate::routes::rooms::join_room,
        crate::routes::rooms::leave_room,
        crate::routes::websocket::lobby_socket,
        crate::routes::websocket::room_socket,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::room::CreateRoomRequest,
            crate::dto::room::RoomOptionsInput,
            crate::dto::room::ActionResponse,
            crate::state::pack::PackPreview,
            crate::state::projection::RoomView,
            crate::state::projection::MemberRoomView,
            crate::state::projection::LobbyRoomView,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "packs", description = "Question packs"),
        (name = "rooms", description = "Room lifecycle"),
        (name = "sockets", description = "Lobby and room WebSocket sessions"),
    )
)]
/// OpenAPI document of the HTTP API.
pub struct ApiDoc;
