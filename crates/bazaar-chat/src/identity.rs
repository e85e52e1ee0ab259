use bazaar_types::{ChatRoomId, ParticipantId};

/// Derive the canonical room id for a pair of participants.
///
/// The two ids are sorted lexicographically and joined under the `chat_`
/// namespace, so the result is identical regardless of argument order:
/// `("user456", "user123")` and `("user123", "user456")` both map to
/// `chat_user123_user456`.
///
/// Pure and total. `a == b` is a degenerate self-chat: the derived id is
/// well-formed (`chat_a_a`) but the room it names fails the two-distinct-
/// participants check downstream. Participant ids containing `_` are not
/// escaped; two distinct pairs can in principle collide, which is accepted
/// as part of the existing id format (see DESIGN.md).
pub fn derive_chat_room_id(a: &ParticipantId, b: &ParticipantId) -> ChatRoomId {
    let (lo, hi) = if a.as_str() <= b.as_str() {
        (a, b)
    } else {
        (b, a)
    };
    ChatRoomId::new(format!("chat_{}_{}", lo, hi))
}
