//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` streams refresh lifecycle and progress
//! events for the datasets a client subscribes to, and accepts refresh
//! commands.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
