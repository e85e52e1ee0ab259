//! Unread/read-state reconciliation.
//!
//! Pure functions over a room's message list. The one rule worth spelling
//! out: a participant's own messages are never unread for them, whatever
//! their `read_by` set says. Counting and last-message selection both take
//! the full message list; the per-update rescan is deliberate (see
//! DESIGN.md).

use bazaar_types::{ChatError, ChatRoom, ConversationSummary, Message, MessageId, ParticipantId};

/// A message is unread for `viewer` iff the viewer neither sent it nor
/// appears in its `read_by` set.
pub fn is_unread(viewer: &ParticipantId, message: &Message) -> bool {
    !message.is_read_by(viewer)
}

pub fn unread_count(viewer: &ParticipantId, messages: &[Message]) -> usize {
    messages.iter().filter(|m| is_unread(viewer, m)).count()
}

/// The message with the maximum `(timestamp, id)`. Ids increase in
/// insertion order, so equal timestamps resolve to the later insert.
pub fn last_message<'a>(messages: &'a [Message]) -> Option<&'a Message> {
    messages
        .iter()
        .max_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)))
}

pub fn is_last_message_from(viewer: &ParticipantId, messages: &[Message]) -> bool {
    last_message(messages).is_some_and(|m| m.sender_id == *viewer)
}

/// The ids to hand to `mark_read` when `viewer` opens the room: every
/// message whose `read_by` set lacks the viewer. This harmlessly includes
/// the viewer's own messages, which are implicitly read already; adding
/// the viewer to their `read_by` is a no-op for every computation here.
pub fn unread_message_ids(viewer: &ParticipantId, messages: &[Message]) -> Vec<MessageId> {
    messages
        .iter()
        .filter(|m| !m.read_by.contains(viewer))
        .map(|m| m.id.clone())
        .collect()
}

/// Derive the chat-list summary of one room for `viewer`. Fails with
/// `DataIntegrity` when the room does not contain exactly one other
/// participant; an empty message list yields a summary with no last
/// message and a zero unread count.
pub fn summarize(
    viewer: &ParticipantId,
    room: &ChatRoom,
    messages: &[Message],
) -> Result<ConversationSummary, ChatError> {
    let other = room.other_participant(viewer)?;
    let last = last_message(messages);

    Ok(ConversationSummary {
        chat_room_id: room.id.clone(),
        other_participant_id: other.clone(),
        last_message_text: last.map(|m| m.text.clone()),
        last_message_timestamp: last.map(|m| m.timestamp),
        unread_count: unread_count(viewer, messages),
        is_last_message_from_viewer: last.is_some_and(|m| m.sender_id == *viewer),
    })
}
