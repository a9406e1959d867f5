//! Library crate for sgame-back, exposing modules for binaries and integration tests.

pub mod config;
/// Room storage: cache, locks, archive and packs.
pub mod dao;
pub mod dto;
/// HTTP-facing service errors.
pub mod error;
pub mod realtime;
/// Axum routers.
pub mod routes;
/// Game logic glue between routes, channels and storage.
pub mod services;
pub mod state;
