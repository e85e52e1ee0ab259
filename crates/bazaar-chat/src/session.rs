//! User-facing chat flows: first contact with a seller, opening a room,
//! sending into an existing room.
//!
//! Failure policy per operation: a failed send is fatal to that action and
//! surfaced to the caller; a failed `mark_read` is logged and the room
//! still opens; a failed notification is logged and the send still counts.

use tracing::warn;

use bazaar_types::models::{validate_message_text, validate_participant};
use bazaar_types::{
    ChatError, ChatRoom, ChatRoomStore, ConversationSummary, Message, MessageNotifier,
    ParticipantId,
};

use crate::identity::derive_chat_room_id;
use crate::unread;

/// Everything the chat-room screen needs after the viewer opens a room.
#[derive(Debug, Clone)]
pub struct OpenedRoom {
    pub room: ChatRoom,
    pub messages: Vec<Message>,
    pub summary: ConversationSummary,
}

/// First-contact flow: derive the room id, create the room if this is the
/// first exchange between the two, and send the opening message.
pub async fn contact_seller(
    store: &dyn ChatRoomStore,
    notifier: &dyn MessageNotifier,
    buyer: &ParticipantId,
    seller: &ParticipantId,
    text: &str,
) -> Result<Message, ChatError> {
    validate_participant(buyer)?;
    validate_participant(seller)?;
    validate_message_text(text)?;

    let room_id = derive_chat_room_id(buyer, seller);
    let room = store
        .get_or_create(&room_id, [buyer.clone(), seller.clone()])
        .await?;
    send_message(store, notifier, &room, buyer, text).await
}

/// Send into an existing room. The recipient is the room's other
/// participant; notification failure is non-fatal.
pub async fn send_message(
    store: &dyn ChatRoomStore,
    notifier: &dyn MessageNotifier,
    room: &ChatRoom,
    sender: &ParticipantId,
    text: &str,
) -> Result<Message, ChatError> {
    let recipient = room.other_participant(sender)?.clone();
    let message = store.append_message(&room.id, sender, text).await?;

    if let Err(err) = notifier.message_sent(&recipient, &message).await {
        warn!(room = %room.id, %recipient, "notification fan-out failed: {err:#}");
    }
    Ok(message)
}

/// Viewer-opens-room flow: get-or-create the room (which refreshes its
/// `updated_at`), load its messages, and issue one best-effort `mark_read`
/// covering every message not yet read by the viewer. The returned state
/// reflects the mark when it succeeded, so the unread count is already
/// zero without a refetch.
pub async fn open_room(
    store: &dyn ChatRoomStore,
    viewer: &ParticipantId,
    other: &ParticipantId,
) -> Result<OpenedRoom, ChatError> {
    validate_participant(viewer)?;
    validate_participant(other)?;

    let room_id = derive_chat_room_id(viewer, other);
    let room = store
        .get_or_create(&room_id, [viewer.clone(), other.clone()])
        .await?;
    let mut messages = store.messages(&room_id).await?;

    let to_mark = unread::unread_message_ids(viewer, &messages);
    if !to_mark.is_empty() {
        match store.mark_read(&room_id, &to_mark, viewer).await {
            Ok(()) => {
                for message in messages.iter_mut() {
                    if to_mark.contains(&message.id) {
                        message.read_by.insert(viewer.clone());
                    }
                }
            }
            // Read state is best-effort; the room still opens
            Err(err) => warn!(room = %room_id, %viewer, "mark_read failed: {err:#}"),
        }
    }

    let summary = unread::summarize(viewer, &room, &messages)?;
    Ok(OpenedRoom {
        room,
        messages,
        summary,
    })
}
