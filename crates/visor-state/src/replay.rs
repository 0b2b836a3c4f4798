//! Deterministic catch-up sequences for newly joined clients.
//!
//! Given a snapshot, produces the minimal message sequence that constructs
//! that exact state from empty. Namespaces are inserted bottom-to-top (each
//! at position 0 of the growing mirror), so the real foreground is broadcast
//! last and ends up freshest; each namespace is followed by its page inserts
//! in order and its data entries in key order.

use visor_core::GuiMessage;

use crate::model::StateSnapshot;

/// Build the replay sequence that reconstructs `snapshot` from empty.
pub fn replay_sequence(snapshot: &StateSnapshot) -> Vec<GuiMessage> {
    let mut messages = Vec::new();
    for ns in snapshot.namespaces.iter().rev() {
        messages.push(GuiMessage::NamespaceInsert {
            namespace: ns.name.clone(),
            position: 0,
        });
        for (position, page) in ns.pages.iter().enumerate() {
            messages.push(GuiMessage::PageInsert {
                namespace: ns.name.clone(),
                page: page.clone(),
                position,
            });
        }
        // BTreeMap iteration is key-ordered, which keeps replay deterministic
        for (key, value) in &ns.data {
            messages.push(GuiMessage::ValueSet {
                namespace: ns.name.clone(),
                key: key.clone(),
                value: value.clone(),
            });
        }
    }
    messages
}
