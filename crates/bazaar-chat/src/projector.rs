//! Live projection of a viewer's rooms into the ordered chat list.
//!
//! One projector instance exists per viewer session. It owns its summary
//! list exclusively, drains room deltas serially on a single task (so two
//! deltas are never processed concurrently), and publishes each new
//! snapshot through a watch channel. Teardown stops the task and drops
//! the underlying subscription; nothing mutates state afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use bazaar_types::{
    ChatError, ChatRoomId, ChatRoomStore, ConversationSummary, ParticipantId, RoomChange,
};

use crate::unread;

pub struct ChatListProjector {
    summaries: watch::Receiver<Vec<ConversationSummary>>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ChatListProjector {
    /// Subscribe to the viewer's room deltas and start projecting.
    pub async fn spawn(
        store: Arc<dyn ChatRoomStore>,
        viewer: ParticipantId,
    ) -> Result<Self, ChatError> {
        let deltas = store.stream_rooms_for(&viewer).await?;
        let (tx, rx) = watch::channel(Vec::new());
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run(store, viewer, deltas, tx, stop_rx));
        Ok(Self {
            summaries: rx,
            stop: stop_tx,
            task,
        })
    }

    /// Current snapshot, newest activity first.
    pub fn summaries(&self) -> Vec<ConversationSummary> {
        self.summaries.borrow().clone()
    }

    /// A receiver that observes every published snapshot.
    pub fn watch(&self) -> watch::Receiver<Vec<ConversationSummary>> {
        self.summaries.clone()
    }

    /// Tear down the projection: stops the task and releases the room
    /// subscription. The last published snapshot stays readable.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

async fn run(
    store: Arc<dyn ChatRoomStore>,
    viewer: ParticipantId,
    mut deltas: BoxStream<'static, RoomChange>,
    tx: watch::Sender<Vec<ConversationSummary>>,
    mut stop: watch::Receiver<bool>,
) {
    debug!(%viewer, "chat list projector subscribed");
    let mut entries: HashMap<ChatRoomId, ConversationSummary> = HashMap::new();

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            delta = deltas.next() => match delta {
                Some(change) => {
                    apply(store.as_ref(), &viewer, &mut entries, change).await;
                    let _ = tx.send(project(&entries));
                }
                None => break,
            }
        }
    }
    debug!(%viewer, "chat list projector unsubscribed");
}

/// Fold one delta into the id-keyed summary map. Replace-or-insert keyed
/// by room id, so a duplicate `Added` at the replay/live seam degrades to
/// a recompute instead of a duplicate row.
async fn apply(
    store: &dyn ChatRoomStore,
    viewer: &ParticipantId,
    entries: &mut HashMap<ChatRoomId, ConversationSummary>,
    change: RoomChange,
) {
    match change {
        RoomChange::Added { room } | RoomChange::Modified { room } => {
            let messages = match store.messages(&room.id).await {
                Ok(messages) => messages,
                Err(err) => {
                    warn!(room = %room.id, "failed to load messages: {err:#}");
                    if entries.contains_key(&room.id) {
                        // Keep the last good summary
                        return;
                    }
                    // A room we have nothing on yet still gets a row,
                    // just without a last message
                    Vec::new()
                }
            };
            match unread::summarize(viewer, &room, &messages) {
                Ok(summary) => {
                    entries.insert(room.id.clone(), summary);
                }
                Err(err) => {
                    // One bad room must not take down the list
                    warn!(room = %room.id, "skipping malformed room: {err}");
                    entries.remove(&room.id);
                }
            }
        }
        RoomChange::Removed { room_id } => {
            entries.remove(&room_id);
        }
    }
}

/// Order for display: latest activity first, rooms without messages last,
/// ties broken by room id for determinism.
fn project(entries: &HashMap<ChatRoomId, ConversationSummary>) -> Vec<ConversationSummary> {
    let mut list: Vec<ConversationSummary> = entries.values().cloned().collect();
    list.sort_by(|a, b| {
        b.last_message_timestamp
            .cmp(&a.last_message_timestamp)
            .then_with(|| a.chat_room_id.cmp(&b.chat_room_id))
    });
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::derive_chat_room_id;
    use crate::memory::MemoryStore;
    use bazaar_types::{ChatRoom, ChatRoomStore};
    use chrono::Utc;
    use std::time::Duration;

    async fn wait_for<F>(
        rx: &mut watch::Receiver<Vec<ConversationSummary>>,
        mut pred: F,
    ) -> Vec<ConversationSummary>
    where
        F: FnMut(&[ConversationSummary]) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                {
                    let current = rx.borrow().clone();
                    if pred(&current) {
                        return current;
                    }
                }
                rx.changed().await.expect("projector task gone");
            }
        })
        .await
        .expect("condition not reached in time")
    }

    fn p(id: &str) -> ParticipantId {
        ParticipantId::from(id)
    }

    #[tokio::test]
    async fn projects_existing_and_new_rooms() {
        let store = MemoryStore::new();
        let viewer = p("viewer");

        let before = derive_chat_room_id(&viewer, &p("early-bird"));
        store
            .get_or_create(&before, [viewer.clone(), p("early-bird")])
            .await
            .unwrap();

        let projector = ChatListProjector::spawn(Arc::new(store.clone()), viewer.clone())
            .await
            .unwrap();
        let mut rx = projector.watch();
        wait_for(&mut rx, |list| list.len() == 1).await;

        let after = derive_chat_room_id(&viewer, &p("latecomer"));
        store
            .get_or_create(&after, [viewer.clone(), p("latecomer")])
            .await
            .unwrap();
        store.append_message(&after, &p("latecomer"), "hello").await.unwrap();

        let list = wait_for(&mut rx, |list| {
            list.len() == 2 && list.iter().any(|s| s.unread_count == 1)
        })
        .await;

        // The room with activity sorts first; the empty room trails
        assert_eq!(list[0].chat_room_id, after);
        assert_eq!(list[0].other_participant_id, p("latecomer"));
        assert_eq!(list[0].last_message_text.as_deref(), Some("hello"));
        assert!(!list[0].is_last_message_from_viewer);
        assert_eq!(list[1].last_message_text, None);

        projector.shutdown().await;
    }

    #[tokio::test]
    async fn one_malformed_room_does_not_take_down_the_list() {
        let store = MemoryStore::new();
        let viewer = p("viewer");
        let now = Utc::now();

        store
            .insert_room_raw(ChatRoom {
                id: ChatRoomId::new("chat_viewer_viewer"),
                participants: [viewer.clone(), viewer.clone()],
                created_at: now,
                updated_at: now,
            })
            .await;

        let good = derive_chat_room_id(&viewer, &p("bob"));
        store
            .get_or_create(&good, [viewer.clone(), p("bob")])
            .await
            .unwrap();
        store.append_message(&good, &p("bob"), "hi there").await.unwrap();

        let projector = ChatListProjector::spawn(Arc::new(store.clone()), viewer.clone())
            .await
            .unwrap();
        let mut rx = projector.watch();

        let list = wait_for(&mut rx, |list| !list.is_empty()).await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].chat_room_id, good);
        assert_eq!(list[0].unread_count, 1);

        projector.shutdown().await;
    }

    #[tokio::test]
    async fn removed_rooms_drop_out() {
        let store = MemoryStore::new();
        let viewer = p("viewer");

        let room_id = derive_chat_room_id(&viewer, &p("bob"));
        store
            .get_or_create(&room_id, [viewer.clone(), p("bob")])
            .await
            .unwrap();

        let projector = ChatListProjector::spawn(Arc::new(store.clone()), viewer.clone())
            .await
            .unwrap();
        let mut rx = projector.watch();
        wait_for(&mut rx, |list| list.len() == 1).await;

        store.remove_room(&room_id).await;
        wait_for(&mut rx, |list| list.is_empty()).await;

        projector.shutdown().await;
    }

    #[tokio::test]
    async fn resorts_on_new_activity() {
        let store = MemoryStore::new();
        let viewer = p("viewer");

        let first = derive_chat_room_id(&viewer, &p("alice"));
        let second = derive_chat_room_id(&viewer, &p("bob"));
        store
            .get_or_create(&first, [viewer.clone(), p("alice")])
            .await
            .unwrap();
        store
            .get_or_create(&second, [viewer.clone(), p("bob")])
            .await
            .unwrap();
        store.append_message(&first, &p("alice"), "older").await.unwrap();
        store.append_message(&second, &p("bob"), "newer").await.unwrap();

        let projector = ChatListProjector::spawn(Arc::new(store.clone()), viewer.clone())
            .await
            .unwrap();
        let mut rx = projector.watch();
        let list = wait_for(&mut rx, |list| {
            list.len() == 2 && list.iter().all(|s| s.last_message_text.is_some())
        })
        .await;
        assert_eq!(list[0].chat_room_id, second);

        // Activity in the older room moves it back to the top
        store.append_message(&first, &p("alice"), "newest").await.unwrap();
        let list = wait_for(&mut rx, |list| {
            list.first()
                .is_some_and(|s| s.last_message_text.as_deref() == Some("newest"))
        })
        .await;
        assert_eq!(list[0].chat_room_id, first);

        projector.shutdown().await;
    }

    #[tokio::test]
    async fn no_updates_after_shutdown() {
        let store = MemoryStore::new();
        let viewer = p("viewer");

        let room_id = derive_chat_room_id(&viewer, &p("bob"));
        store
            .get_or_create(&room_id, [viewer.clone(), p("bob")])
            .await
            .unwrap();

        let projector = ChatListProjector::spawn(Arc::new(store.clone()), viewer.clone())
            .await
            .unwrap();
        let mut rx = projector.watch();
        wait_for(&mut rx, |list| list.len() == 1).await;

        let frozen = projector.summaries();
        projector.shutdown().await;

        store.append_message(&room_id, &p("bob"), "too late").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let after: Vec<ConversationSummary> = rx.borrow().clone();
        assert_eq!(after.len(), frozen.len());
        assert_eq!(after[0].last_message_text, frozen[0].last_message_text);
    }
}
