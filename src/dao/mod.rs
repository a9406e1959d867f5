/// Read-only pack lookup.
pub mod pack_store;
/// Key/value backend holding live rooms, TTLs and locks.
pub mod room_cache;
/// Durable archive of finished rooms.
pub mod room_repository;
/// Locked access to live rooms.
pub mod room_store;
/// Storage abstraction layer for database operations.
pub mod storage;
