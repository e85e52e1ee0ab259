use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS chats (
            id              TEXT PRIMARY KEY,
            participant_a   TEXT NOT NULL,
            participant_b   TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chats_participant_a
            ON chats(participant_a, updated_at);
        CREATE INDEX IF NOT EXISTS idx_chats_participant_b
            ON chats(participant_b, updated_at);

        -- seq is the insertion order; message ids are derived from it so
        -- they sort the same way.
        CREATE TABLE IF NOT EXISTS messages (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT NOT NULL UNIQUE,
            chat_id     TEXT NOT NULL REFERENCES chats(id),
            sender_id   TEXT NOT NULL,
            text        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(chat_id, seq);

        CREATE TABLE IF NOT EXISTS message_reads (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            reader_id   TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(message_id, reader_id)
        );

        CREATE INDEX IF NOT EXISTS idx_reads_message
            ON message_reads(message_id);
        ",
    )?;

    info!("chat store migrations complete");
    Ok(())
}
