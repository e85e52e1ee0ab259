//! In-memory `ChatRoomStore` used as the test fake and for local runs.
//! Same change-feed shape as the SQLite store, no persistence.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::BoxStream;
use tokio::sync::{RwLock, broadcast};
use tracing::warn;

use bazaar_types::models::{validate_message_text, validate_participant};
use bazaar_types::store::StoreResult;
use bazaar_types::{
    ChatError, ChatEvent, ChatRoom, ChatRoomId, ChatRoomStore, Message, MessageId, ParticipantId,
    RoomChange,
};

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    rooms: RwLock<HashMap<ChatRoomId, RoomState>>,
    next_seq: AtomicU64,
    events: broadcast::Sender<ChatEvent>,
}

struct RoomState {
    room: ChatRoom,
    messages: Vec<Message>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(StoreInner {
                rooms: RwLock::new(HashMap::new()),
                next_seq: AtomicU64::new(1),
                events,
            }),
        }
    }

    fn publish(&self, event: ChatEvent) {
        let _ = self.inner.events.send(event);
    }

    fn next_message_id(&self) -> MessageId {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        MessageId::new(format!("msg-{seq:012}"))
    }

    /// Test hook: insert a room as-is, bypassing id derivation and the
    /// participant checks, so malformed data can be simulated.
    pub async fn insert_room_raw(&self, room: ChatRoom) {
        let mut rooms = self.inner.rooms.write().await;
        rooms.insert(
            room.id.clone(),
            RoomState {
                room: room.clone(),
                messages: Vec::new(),
            },
        );
        drop(rooms);
        self.publish(ChatEvent::RoomUpserted {
            room,
            newly_created: true,
        });
    }

    /// Admin-style room deletion; the chat core itself never deletes rooms
    /// but must cope with them disappearing.
    pub async fn remove_room(&self, id: &ChatRoomId) {
        let removed = self.inner.rooms.write().await.remove(id);
        if let Some(state) = removed {
            self.publish(ChatEvent::RoomRemoved { room: state.room });
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatRoomStore for MemoryStore {
    async fn get_or_create(
        &self,
        id: &ChatRoomId,
        participants: [ParticipantId; 2],
    ) -> StoreResult<ChatRoom> {
        validate_participant(&participants[0])?;
        validate_participant(&participants[1])?;

        let now = Utc::now();
        let mut rooms = self.inner.rooms.write().await;
        let (room, newly_created) = match rooms.get_mut(id) {
            Some(state) => {
                state.room.updated_at = now;
                (state.room.clone(), false)
            }
            None => {
                let room = ChatRoom {
                    id: id.clone(),
                    participants,
                    created_at: now,
                    updated_at: now,
                };
                rooms.insert(
                    id.clone(),
                    RoomState {
                        room: room.clone(),
                        messages: Vec::new(),
                    },
                );
                (room, true)
            }
        };
        drop(rooms);

        self.publish(ChatEvent::RoomUpserted {
            room: room.clone(),
            newly_created,
        });
        Ok(room)
    }

    async fn get_room(&self, id: &ChatRoomId) -> StoreResult<ChatRoom> {
        self.inner
            .rooms
            .read()
            .await
            .get(id)
            .map(|state| state.room.clone())
            .ok_or_else(|| ChatError::NotFound(id.clone()))
    }

    async fn append_message(
        &self,
        room_id: &ChatRoomId,
        sender: &ParticipantId,
        text: &str,
    ) -> StoreResult<Message> {
        validate_participant(sender)?;
        validate_message_text(text)?;

        let mut rooms = self.inner.rooms.write().await;
        let state = rooms
            .get_mut(room_id)
            .ok_or_else(|| ChatError::NotFound(room_id.clone()))?;

        let message = Message {
            id: self.next_message_id(),
            chat_room_id: room_id.clone(),
            sender_id: sender.clone(),
            text: text.to_string(),
            timestamp: Utc::now(),
            read_by: BTreeSet::new(),
        };
        state.messages.push(message.clone());
        state.room.updated_at = message.timestamp;
        let room = state.room.clone();
        drop(rooms);

        self.publish(ChatEvent::MessageAppended {
            room,
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

        let mut rooms = self.inner.rooms.write().await;
        let state = rooms
            .get_mut(room_id)
            .ok_or_else(|| ChatError::NotFound(room_id.clone()))?;

        for message in state.messages.iter_mut() {
            if message_ids.contains(&message.id) {
                message.read_by.insert(reader.clone());
            }
        }
        let room = state.room.clone();
        drop(rooms);

        self.publish(ChatEvent::MessagesRead {
            room,
            reader: reader.clone(),
            message_ids: message_ids.to_vec(),
        });
        Ok(())
    }

    async fn messages(&self, room_id: &ChatRoomId) -> StoreResult<Vec<Message>> {
        self.inner
            .rooms
            .read()
            .await
            .get(room_id)
            .map(|state| state.messages.clone())
            .ok_or_else(|| ChatError::NotFound(room_id.clone()))
    }

    async fn stream_messages(
        &self,
        room_id: &ChatRoomId,
    ) -> StoreResult<BoxStream<'static, Message>> {
        let mut rx = self.inner.events.subscribe();
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

        let mut rx = self.inner.events.subscribe();
        let existing: Vec<ChatRoom> = {
            let rooms = self.inner.rooms.read().await;
            let mut current: Vec<ChatRoom> = rooms
                .values()
                .filter(|state| state.room.has_participant(participant))
                .map(|state| state.room.clone())
                .collect();
            current.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            current
        };
        let participant = participant.clone();

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
