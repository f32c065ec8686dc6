//! Real-time core: sessions, the per-user connection registry, notification
//! inboxes, chats, and the fan-out that ties domain events to pushes.

pub mod chats;
pub mod connection;
pub mod directory;
pub mod error;
pub mod fanout;
pub mod notifications;
pub mod registry;
pub mod session;
pub mod sink;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ErrorKind, GatewayError, GatewayResult};
