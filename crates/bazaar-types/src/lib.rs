pub mod error;
pub mod events;
pub mod models;
pub mod store;

pub use error::ChatError;
pub use events::{ChatEvent, RoomChange};
pub use models::{ChatRoom, ChatRoomId, ConversationSummary, Message, MessageId, ParticipantId};
pub use store::{ChatRoomStore, MessageNotifier, StoreResult};
