use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

use crate::models::{ChatRow, MessageRow, ReadRow};

pub fn query_room(conn: &Connection, id: &str) -> Result<Option<ChatRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, participant_a, participant_b, created_at, updated_at
         FROM chats WHERE id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(ChatRow {
                id: row.get(0)?,
                participant_a: row.get(1)?,
                participant_b: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Idempotent room upsert: refresh `updated_at` when the room exists,
/// create it otherwise. Returns the resulting row and whether it was new.
pub fn get_or_create_room(
    conn: &Connection,
    id: &str,
    participant_a: &str,
    participant_b: &str,
    now: &str,
) -> Result<(ChatRow, bool)> {
    let newly_created = match query_room(conn, id)? {
        Some(_) => {
            conn.execute(
                "UPDATE chats SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![now, id],
            )?;
            false
        }
        None => {
            conn.execute(
                "INSERT INTO chats (id, participant_a, participant_b, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![id, participant_a, participant_b, now],
            )?;
            true
        }
    };

    let row = query_room(conn, id)?
        .ok_or_else(|| anyhow::anyhow!("chat {} vanished during upsert", id))?;
    Ok((row, newly_created))
}

pub fn query_rooms_for(conn: &Connection, participant: &str) -> Result<Vec<ChatRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, participant_a, participant_b, created_at, updated_at
         FROM chats
         WHERE participant_a = ?1 OR participant_b = ?1
         ORDER BY updated_at DESC",
    )?;

    let rows = stmt
        .query_map([participant], |row| {
            Ok(ChatRow {
                id: row.get(0)?,
                participant_a: row.get(1)?,
                participant_b: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Append a message and bump the room's `updated_at`. The id is derived
/// from the insertion sequence so that ids sort in insertion order.
pub fn insert_message(
    conn: &Connection,
    chat_id: &str,
    sender_id: &str,
    text: &str,
    now: &str,
) -> Result<MessageRow> {
    let next: i64 = conn.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM messages", [], |row| {
        row.get(0)
    })?;
    let id = format!("msg-{next:012}");

    conn.execute(
        "INSERT INTO messages (seq, id, chat_id, sender_id, text, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![next, id, chat_id, sender_id, text, now],
    )?;
    conn.execute(
        "UPDATE chats SET updated_at = ?1 WHERE id = ?2",
        rusqlite::params![now, chat_id],
    )?;

    Ok(MessageRow {
        id,
        chat_id: chat_id.to_string(),
        sender_id: sender_id.to_string(),
        text: text.to_string(),
        created_at: now.to_string(),
    })
}

pub fn query_messages(conn: &Connection, chat_id: &str) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_id, sender_id, text, created_at
         FROM messages
         WHERE chat_id = ?1
         ORDER BY seq ASC",
    )?;

    let rows = stmt
        .query_map([chat_id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                chat_id: row.get(1)?,
                sender_id: row.get(2)?,
                text: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Batch-fetch read receipts for a set of message ids.
pub fn query_reads_for_messages(conn: &Connection, message_ids: &[String]) -> Result<Vec<ReadRow>> {
    if message_ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT message_id, reader_id FROM message_reads WHERE message_id IN ({})",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
        .iter()
        .map(|id| id as &dyn rusqlite::types::ToSql)
        .collect();

    let rows = stmt
        .query_map(params.as_slice(), |row| {
            Ok(ReadRow {
                message_id: row.get(0)?,
                reader_id: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Add `reader` to the read set of each listed message. `INSERT OR IGNORE`
/// against the UNIQUE(message_id, reader_id) constraint makes this a
/// set union, so redundant calls are no-ops. Ids not belonging to the room
/// are silently skipped by the inner SELECT.
pub fn mark_read(
    conn: &Connection,
    chat_id: &str,
    message_ids: &[String],
    reader_id: &str,
    now: &str,
) -> Result<()> {
    if message_ids.is_empty() {
        return Ok(());
    }

    let placeholders: Vec<String> = (4..4 + message_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT OR IGNORE INTO message_reads (message_id, reader_id, created_at)
         SELECT id, ?1, ?2 FROM messages WHERE chat_id = ?3 AND id IN ({})",
        placeholders.join(", ")
    );

    let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&reader_id, &now, &chat_id];
    for id in message_ids {
        params.push(id as &dyn rusqlite::types::ToSql);
    }

    let mut stmt = conn.prepare(&sql)?;
    stmt.execute(params.as_slice())?;
    Ok(())
}
