//! Smoke binary: runs a scripted buyer/seller conversation against the
//! SQLite store and prints both chat lists, for poking at the core without
//! a UI in front of it.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use bazaar_chat::notify::LogNotifier;
use bazaar_chat::{ChatListProjector, contact_seller, open_room, send_message};
use bazaar_db::SqliteStore;
use bazaar_types::{ChatRoomStore, ConversationSummary, ParticipantId};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bazaar=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("BAZAAR_DB_PATH").unwrap_or_else(|_| "bazaar.db".into());
    let buyer = ParticipantId::new(
        std::env::var("BAZAAR_BUYER").unwrap_or_else(|_| "buyer-demo".into()),
    );
    let seller = ParticipantId::new(
        std::env::var("BAZAAR_SELLER").unwrap_or_else(|_| "seller-demo".into()),
    );

    let store = SqliteStore::open(&PathBuf::from(&db_path))?;
    let store: Arc<dyn ChatRoomStore> = Arc::new(store);

    // Buyer reaches out about a listing
    let message = contact_seller(
        store.as_ref(),
        &LogNotifier,
        &buyer,
        &seller,
        "Hi, is this available?",
    )
    .await?;
    info!(room = %message.chat_room_id, "first contact sent");

    // Seller's chat list before opening the room
    let seller_list = ChatListProjector::spawn(store.clone(), seller.clone()).await?;
    let mut rx = seller_list.watch();
    print_list(
        "seller (before opening)",
        &wait_for(&mut rx, |list| !list.is_empty()).await?,
    );

    // Seller opens the room and replies
    let opened = open_room(store.as_ref(), &seller, &buyer).await?;
    info!(
        unread = opened.summary.unread_count,
        messages = opened.messages.len(),
        "seller opened the room"
    );
    send_message(store.as_ref(), &LogNotifier, &opened.room, &seller, "It is!").await?;

    // Wait until the projector has caught up with the reply before
    // printing, so the snapshot is not the pre-open state
    print_list(
        "seller (after opening)",
        &wait_for(&mut rx, |list| {
            list.first()
                .is_some_and(|s| s.is_last_message_from_viewer && s.unread_count == 0)
        })
        .await?,
    );
    seller_list.shutdown().await;

    // Buyer's view of the same conversation
    let buyer_list = ChatListProjector::spawn(store.clone(), buyer.clone()).await?;
    let mut rx = buyer_list.watch();
    print_list("buyer", &wait_for(&mut rx, |list| !list.is_empty()).await?);
    buyer_list.shutdown().await;

    Ok(())
}

/// Wait for a chat-list snapshot satisfying `pred`.
async fn wait_for<F>(
    rx: &mut tokio::sync::watch::Receiver<Vec<ConversationSummary>>,
    mut pred: F,
) -> anyhow::Result<Vec<ConversationSummary>>
where
    F: FnMut(&[ConversationSummary]) -> bool,
{
    loop {
        {
            let current = rx.borrow();
            if pred(&current) {
                return Ok(current.clone());
            }
        }
        rx.changed().await?;
    }
}

fn print_list(label: &str, summaries: &[ConversationSummary]) {
    println!("-- {label} --");
    for summary in summaries {
        match serde_json::to_string(summary) {
            Ok(line) => println!("{line}"),
            Err(err) => eprintln!("unprintable summary: {err}"),
        }
    }
}
