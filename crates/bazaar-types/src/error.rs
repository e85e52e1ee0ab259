use thiserror::Error;

use crate::models::ChatRoomId;

/// Error taxonomy for the chat core.
///
/// `Validation` and `DataIntegrity` are recoverable at the call site;
/// `NotFound` is surfaced to the caller without retry; `Backend` wraps
/// whatever the store's transport failed with and is retried only by the
/// backend's own reconnection, never by this core.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("chat room {room_id} has a malformed participant set")]
    DataIntegrity { room_id: ChatRoomId },

    #[error("chat room {0} not found")]
    NotFound(ChatRoomId),

    #[error("backend unavailable: {0}")]
    Backend(#[source] anyhow::Error),
}

impl ChatError {
    pub fn backend(err: impl Into<anyhow::Error>) -> Self {
        Self::Backend(err.into())
    }
}
