/// Game actions sent by room members.
pub mod client_events;
/// Deferred continuations behind every timed phase.
pub mod continuations;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Lobby socket processor.
pub mod lobby_events;
/// Fan-out helpers for the room, internal and lobby topics.
pub mod room_broadcasts;
/// Room member socket processor and the per-room scheduler.
pub mod room_events;
/// Room creation, membership and listing.
pub mod room_service;
/// Archive connection supervisor with degraded-mode tracking.
pub mod storage_supervisor;
