use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::ChatError;
use crate::events::RoomChange;
use crate::models::{ChatRoom, ChatRoomId, Message, MessageId, ParticipantId};

pub type StoreResult<T> = Result<T, ChatError>;

/// The document-store collaborator the chat core runs against.
///
/// Any backend offering get/upsert by id, idempotent set-union updates,
/// ordered range queries and a live change feed satisfies this interface;
/// the workspace ships a SQLite implementation (`bazaar-db`) and an
/// in-memory fake (`bazaar_chat::memory`).
#[async_trait]
pub trait ChatRoomStore: Send + Sync {
    /// Idempotent lookup-or-create. An existing room is returned with its
    /// `updated_at` refreshed; a missing one is created with both
    /// timestamps set to now.
    async fn get_or_create(
        &self,
        id: &ChatRoomId,
        participants: [ParticipantId; 2],
    ) -> StoreResult<ChatRoom>;

    /// Direct lookup; fails with `NotFound` when the room does not exist.
    async fn get_room(&self, id: &ChatRoomId) -> StoreResult<ChatRoom>;

    /// Append a message. The store assigns the authoritative id and
    /// timestamp and bumps the room's `updated_at`. Fails with
    /// `Validation` when `text` is empty after trimming.
    async fn append_message(
        &self,
        room_id: &ChatRoomId,
        sender: &ParticipantId,
        text: &str,
    ) -> StoreResult<Message>;

    /// Add `reader` to the `read_by` set of each listed message. Safe to
    /// call redundantly: adding an already-present reader is a no-op.
    async fn mark_read(
        &self,
        room_id: &ChatRoomId,
        message_ids: &[MessageId],
        reader: &ParticipantId,
    ) -> StoreResult<()>;

    /// All messages of a room, ascending by `(timestamp, id)`.
    async fn messages(&self, room_id: &ChatRoomId) -> StoreResult<Vec<Message>>;

    /// Live message feed for one room: replays the current messages in
    /// ascending order, then emits each append. Restartable; an event
    /// landing during the replay/live handover may be delivered twice.
    async fn stream_messages(&self, room_id: &ChatRoomId)
        -> StoreResult<BoxStream<'static, Message>>;

    /// Live room-delta feed for one participant: replays the rooms the
    /// participant is in as `Added`, then emits live deltas. Dropping the
    /// stream ends the subscription.
    async fn stream_rooms_for(
        &self,
        participant: &ParticipantId,
    ) -> StoreResult<BoxStream<'static, RoomChange>>;
}

/// Post-send notification hook. Delivery transport is out of scope for the
/// chat core; implementations log, enqueue, or drop. A failure here must
/// never fail the send that triggered it.
#[async_trait]
pub trait MessageNotifier: Send + Sync {
    async fn message_sent(&self, recipient: &ParticipantId, message: &Message)
        -> anyhow::Result<()>;
}
