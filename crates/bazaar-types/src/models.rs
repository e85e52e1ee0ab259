use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Backend-assigned user identity. Opaque; the only invariant is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Derived room identifier of the form `chat_<a>_<b>` with the participant
/// ids in lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatRoomId(String);

impl ChatRoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatRoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-assigned message identifier. Stores assign ids that increase
/// lexicographically in insertion order, so `(timestamp, id)` is a total
/// order consistent with the backend's insertion order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Two-party conversation container. Created lazily on first contact and
/// never deleted by the chat core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: ChatRoomId,
    pub participants: [ParticipantId; 2],
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRoom {
    /// The participant that is not `viewer`. Fails with `DataIntegrity`
    /// when the room does not contain exactly one other participant
    /// (self-chat, or the viewer is not a member at all).
    pub fn other_participant(&self, viewer: &ParticipantId) -> Result<&ParticipantId, ChatError> {
        let [a, b] = &self.participants;
        match (a == viewer, b == viewer) {
            (true, false) => Ok(b),
            (false, true) => Ok(a),
            _ => Err(ChatError::DataIntegrity {
                room_id: self.id.clone(),
            }),
        }
    }

    pub fn has_participant(&self, id: &ParticipantId) -> bool {
        self.participants.contains(id)
    }
}

/// A chat message. Immutable after creation except for `read_by`, which
/// only ever grows (set union).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_room_id: ChatRoomId,
    pub sender_id: ParticipantId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub read_by: BTreeSet<ParticipantId>,
}

impl Message {
    /// A sender's own messages are always read by their author, regardless
    /// of the `read_by` contents.
    pub fn is_read_by(&self, viewer: &ParticipantId) -> bool {
        self.sender_id == *viewer || self.read_by.contains(viewer)
    }
}

/// Derived projection of one room for the chat list. Never persisted;
/// recomputed on every relevant change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub chat_room_id: ChatRoomId,
    pub other_participant_id: ParticipantId,
    pub last_message_text: Option<String>,
    pub last_message_timestamp: Option<DateTime<Utc>>,
    pub unread_count: usize,
    pub is_last_message_from_viewer: bool,
}

/// Reject empty or whitespace-only message text before any backend call.
pub fn validate_message_text(text: &str) -> Result<(), ChatError> {
    if text.trim().is_empty() {
        return Err(ChatError::Validation(
            "message text must not be empty".into(),
        ));
    }
    Ok(())
}

/// Reject a missing participant id before any backend call.
pub fn validate_participant(id: &ParticipantId) -> Result<(), ChatError> {
    if id.is_empty() {
        return Err(ChatError::Validation("participant id is required".into()));
    }
    Ok(())
}
