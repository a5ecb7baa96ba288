//! WebSocket gateway: wire types, per-connection outbound queue and the socket handler

pub mod handler;
pub mod outbound;
pub mod protocol;
