//! Chat core for a two-party marketplace: deterministic room identity,
//! unread/read-state reconciliation, and a live-projected chat list.
//!
//! The core is written against the `ChatRoomStore` collaborator trait and
//! never talks to a concrete backend itself; `bazaar-db` provides a SQLite
//! implementation and [`memory::MemoryStore`] an in-memory one for tests.

pub mod identity;
pub mod memory;
pub mod notify;
pub mod projector;
pub mod session;
pub mod unread;

pub use identity::derive_chat_room_id;
pub use projector::ChatListProjector;
pub use session::{contact_seller, open_room, send_message, OpenedRoom};
