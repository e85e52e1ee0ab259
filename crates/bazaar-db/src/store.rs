use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::BoxStream;
use rusqlite::Connection;
use tokio::sync::broadcast;
use tracing::warn;

use bazaar_types::models::{validate_message_text, validate_participant};
use bazaar_types::store::StoreResult;
use bazaar_types::{
    ChatError, ChatEvent, ChatRoom, ChatRoomId, ChatRoomStore, Message, MessageId, ParticipantId,
    RoomChange,
};

use crate::models::format_ts;
use crate::{SqliteStore, queries};

fn load_messages(conn: &Connection, room_id: &str) -> anyhow::Result<Vec<Message>> {
    let rows = queries::query_messages(conn, room_id)?;
    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let reads = queries::query_reads_for_messages(conn, &ids)?;

    let mut read_map: HashMap<String, BTreeSet<ParticipantId>> = HashMap::new();
    for read in reads {
        read_map
            .entry(read.message_id)
            .or_default()
            .insert(ParticipantId::new(read.reader_id));
    }

    rows.into_iter()
        .map(|row| {
            let read_by = read_map.remove(&row.id).unwrap_or_default();
            row.into_message(read_by)
        })
        .collect()
}

impl SqliteStore {
    async fn run_blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteStore) -> StoreResult<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(ChatError::backend)?
    }
}

#[async_trait]
impl ChatRoomStore for SqliteStore {
    async fn get_or_create(
        &self,
        id: &ChatRoomId,
        participants: [ParticipantId; 2],
    ) -> StoreResult<ChatRoom> {
        validate_participant(&participants[0])?;
        validate_participant(&participants[1])?;

        let id = id.clone();
        let (room, newly_created) = self
            .run_blocking(move |store| {
                store
                    .inner
                    .with_conn_mut(|conn| {
                        let tx = conn.transaction()?;
                        let now = format_ts(Utc::now());
                        let (row, newly_created) = queries::get_or_create_room(
                            &tx,
                            id.as_str(),
                            participants[0].as_str(),
                            participants[1].as_str(),
                            &now,
                        )?;
                        tx.commit()?;
                        Ok((row.into_room()?, newly_created))
                    })
                    .map_err(ChatError::backend)
            })
            .await?;

        self.publish(ChatEvent::RoomUpserted {
            room: room.clone(),
            newly_created,
        });
        Ok(room)
    }

    async fn get_room(&self, id: &ChatRoomId) -> StoreResult<ChatRoom> {
        let id = id.clone();
        self.run_blocking(move |store| {
            let row = store
                .inner
                .with_conn(|conn| queries::query_room(conn, id.as_str()))
                .map_err(ChatError::backend)?
                .ok_or_else(|| ChatError::NotFound(id.clone()))?;
            row.into_room().map_err(ChatError::backend)
        })
        .await
    }

    async fn append_message(
        &self,
        room_id: &ChatRoomId,
        sender: &ParticipantId,
        text: &str,
    ) -> StoreResult<Message> {
        validate_participant(sender)?;
        validate_message_text(text)?;

        let room_id = room_id.clone();
        let sender = sender.clone();
        let text = text.to_string();
        let (room, message) = self
            .run_blocking(move |store| {
                store.inner.with_conn_mut(|conn| {
                    let tx = conn.transaction()?;
                    if queries::query_room(&tx, room_id.as_str())?.is_none() {
                        return Ok(Err(ChatError::NotFound(room_id.clone())));
                    }
                    let now = format_ts(Utc::now());
                    let row = queries::insert_message(
                        &tx,
                        room_id.as_str(),
                        sender.as_str(),
                        &text,
                        &now,
                    )?;
                    let room_row = queries::query_room(&tx, room_id.as_str())?
                        .ok_or_else(|| anyhow::anyhow!("chat {} vanished during send", room_id))?;
                    tx.commit()?;
                    Ok(Ok((room_row.into_room()?, row.into_message(BTreeSet::new())?)))
                })
                .map_err(ChatError::backend)?
            })
            .await?;

        self.publish(ChatEvent::MessageAppended {
            room: room.clone(),
            message: message.clone(),
        });
        Ok(message)
    }

    async fn mark_read(
        &self,
        room_id: &ChatRoomId,
        message_ids: &[MessageId],
        reader: &ParticipantId,
    ) -> StoreResult<()> {
        validate_participant(reader)?;
        if message_ids.is_empty() {
            return Ok(());
        }

        let room_id = room_id.clone();
        let reader = reader.clone();
        let reader_for_query = reader.clone();
        let ids: Vec<String> = message_ids.iter().map(|m| m.as_str().to_string()).collect();
        let event_ids: Vec<MessageId> = message_ids.to_vec();
        let room = self
            .run_blocking(move |store| {
                store.inner.with_conn_mut(|conn| {
                    let tx = conn.transaction()?;
                    let Some(room_row) = queries::query_room(&tx, room_id.as_str())? else {
                        return Ok(Err(ChatError::NotFound(room_id.clone())));
                    };
                    let now = format_ts(Utc::now());
                    queries::mark_read(&tx, room_id.as_str(), &ids, reader_for_query.as_str(), &now)?;
                    tx.commit()?;
                    Ok(Ok(room_row.into_room()?))
                })
                .map_err(ChatError::backend)?
            })
            .await?;

        self.publish(ChatEvent::MessagesRead {
            room,
            reader,
            message_ids: event_ids,
        });
        Ok(())
    }

    async fn messages(&self, room_id: &ChatRoomId) -> StoreResult<Vec<Message>> {
        let room_id = room_id.clone();
        self.run_blocking(move |store| {
            store.inner.with_conn(|conn| {
                if queries::query_room(conn, room_id.as_str())?.is_none() {
                    return Ok(Err(ChatError::NotFound(room_id.clone())));
                }
                Ok(Ok(load_messages(conn, room_id.as_str())?))
            })
            .map_err(ChatError::backend)?
        })
        .await
    }

    async fn stream_messages(
        &self,
        room_id: &ChatRoomId,
    ) -> StoreResult<BoxStream<'static, Message>> {
        // Subscribe before the replay query so nothing lands in the gap
        let mut rx = self.subscribe();
        let existing = self.messages(room_id).await?;
        let room_id = room_id.clone();

        let stream = async_stream::stream! {
            for message in existing {
                yield message;
            }
            loop {
                match rx.recv().await {
                    Ok(ChatEvent::MessageAppended { room, message }) if room.id == room_id => {
                        yield message;
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%room_id, skipped, "message feed lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn stream_rooms_for(
        &self,
        participant: &ParticipantId,
    ) -> StoreResult<BoxStream<'static, RoomChange>> {
        validate_participant(participant)?;

        let mut rx = self.subscribe();
        let participant = participant.clone();

        let lookup = participant.clone();
        let existing = self
            .run_blocking(move |store| {
                store
                    .inner
                    .with_conn(|conn| {
                        queries::query_rooms_for(conn, lookup.as_str())?
                            .into_iter()
                            .map(|row| row.into_room())
                            .collect::<anyhow::Result<Vec<_>>>()
                    })
                    .map_err(ChatError::backend)
            })
            .await?;

        let stream = async_stream::stream! {
            for room in existing {
                yield RoomChange::Added { room };
            }
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Some(change) = event.room_change_for(&participant) {
                            yield change;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%participant, skipped, "room feed lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Ok(Box::pin(stream))
    }
}
