//! Database row types — these map directly to SQLite rows.
//! Distinct from the bazaar-types domain models to keep the DB layer
//! independent; conversion happens at the store boundary.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use bazaar_types::models::{ChatRoom, ChatRoomId, Message, MessageId, ParticipantId};

pub struct ChatRow {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub text: String,
    pub created_at: String,
}

pub struct ReadRow {
    pub message_id: String,
    pub reader_id: String,
}

/// Fixed-width RFC 3339 so that the stored strings sort chronologically.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("corrupt timestamp '{raw}'"))
}

impl ChatRow {
    pub fn into_room(self) -> Result<ChatRoom> {
        Ok(ChatRoom {
            id: ChatRoomId::new(self.id),
            participants: [
                ParticipantId::new(self.participant_a),
                ParticipantId::new(self.participant_b),
            ],
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

impl MessageRow {
    pub fn into_message(self, read_by: BTreeSet<ParticipantId>) -> Result<Message> {
        Ok(Message {
            id: MessageId::new(self.id),
            chat_room_id: ChatRoomId::new(self.chat_id),
            sender_id: ParticipantId::new(self.sender_id),
            text: self.text,
            timestamp: parse_ts(&self.created_at)?,
            read_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_round_trip_and_sort() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::microseconds(1);

        let a = format_ts(earlier);
        let b = format_ts(later);
        assert!(a < b);
        // formatting truncates to microseconds
        assert_eq!(
            parse_ts(&a).unwrap().timestamp_micros(),
            earlier.timestamp_micros()
        );
    }
}
