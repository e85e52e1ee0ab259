use serde::{Deserialize, Serialize};

use crate::models::{ChatRoom, ChatRoomId, Message, MessageId, ParticipantId};

/// Change-feed events published by a `ChatRoomStore` after each successful
/// write. Subscriptions filter these down to the deltas a given consumer
/// cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatEvent {
    /// A room was created, or an existing room's `updated_at` was refreshed.
    RoomUpserted { room: ChatRoom, newly_created: bool },

    /// A message was appended to a room.
    MessageAppended { room: ChatRoom, message: Message },

    /// A reader was added to the `read_by` set of the listed messages.
    MessagesRead {
        room: ChatRoom,
        reader: ParticipantId,
        message_ids: Vec<MessageId>,
    },

    /// A room was deleted out from under the chat core (admin tooling).
    RoomRemoved { room: ChatRoom },
}

impl ChatEvent {
    pub fn room(&self) -> &ChatRoom {
        match self {
            Self::RoomUpserted { room, .. }
            | Self::MessageAppended { room, .. }
            | Self::MessagesRead { room, .. }
            | Self::RoomRemoved { room } => room,
        }
    }

    /// Project this event into the room delta seen by one participant's
    /// chat-list subscription, or `None` when the event concerns a room
    /// the participant is not part of.
    pub fn room_change_for(&self, participant: &ParticipantId) -> Option<RoomChange> {
        if !self.room().has_participant(participant) {
            return None;
        }
        Some(match self {
            Self::RoomUpserted {
                room,
                newly_created: true,
            } => RoomChange::Added { room: room.clone() },
            Self::RoomUpserted { room, .. }
            | Self::MessageAppended { room, .. }
            | Self::MessagesRead { room, .. } => RoomChange::Modified { room: room.clone() },
            Self::RoomRemoved { room } => RoomChange::Removed {
                room_id: room.id.clone(),
            },
        })
    }
}

/// One delta delivered by `stream_rooms_for`. A freshly opened subscription
/// replays the rooms that already exist as `Added`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RoomChange {
    Added { room: ChatRoom },
    Modified { room: ChatRoom },
    Removed { room_id: ChatRoomId },
}

impl RoomChange {
    pub fn room_id(&self) -> &ChatRoomId {
        match self {
            Self::Added { room } | Self::Modified { room } => &room.id,
            Self::Removed { room_id } => room_id,
        }
    }
}
