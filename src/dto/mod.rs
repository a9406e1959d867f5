//! Bodies and query strings of the HTTP routes, plus the websocket message envelope.

pub mod health;
pub mod message;
pub mod room;
