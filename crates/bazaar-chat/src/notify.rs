//! Post-send notification fan-out.
//!
//! Sending a message wants to poke the recipient's devices, but delivery
//! transport is a backend concern; the core only exposes the hook and
//! guarantees that a notifier failure never fails the send.

use async_trait::async_trait;
use tracing::info;

use bazaar_types::{Message, MessageNotifier, ParticipantId};

/// Notifier that records the fan-out in the log stream.
pub struct LogNotifier;

#[async_trait]
impl MessageNotifier for LogNotifier {
    async fn message_sent(
        &self,
        recipient: &ParticipantId,
        message: &Message,
    ) -> anyhow::Result<()> {
        info!(
            %recipient,
            message_id = %message.id,
            room = %message.chat_room_id,
            "new message notification"
        );
        Ok(())
    }
}

/// Notifier that drops everything on the floor.
pub struct NullNotifier;

#[async_trait]
impl MessageNotifier for NullNotifier {
    async fn message_sent(&self, _: &ParticipantId, _: &Message) -> anyhow::Result<()> {
        Ok(())
    }
}
