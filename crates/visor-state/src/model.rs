//! The canonical namespace stack.
//!
//! Position 0 is the foreground surface. Every mutation returns the wire
//! messages that describe it, in the order they must reach clients; the
//! dispatcher owns broadcasting them. The model itself is not thread-safe —
//! the dispatcher wraps it in its single-writer lock.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;
use visor_core::GuiMessage;
use visor_settings::PinnedPrecedence;

/// Data keys used internally by the protocol; never stored or replayed.
pub const RESERVED_KEYS: &[&str] = &["__from", "__idle"];

/// How long a namespace stays in the stack after its last activation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifetime {
    /// Never auto-removed.
    Persistent,
    /// Auto-removed this many seconds after the last activation.
    Seconds(u64),
}

/// One GUI surface: a skill's pages and session data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuiNamespace {
    /// Skill identifier; unique within the stack.
    pub name: String,
    /// Ordered page sequence (opaque identifiers/URIs).
    pub pages: Vec<String>,
    /// Session data exposed to whatever renders this namespace.
    /// `BTreeMap` so iteration (and therefore replay) is key-ordered.
    pub data: BTreeMap<String, Value>,
    /// Pinned namespaces survive having zero pages.
    pub pinned: bool,
    /// Auto-removal policy.
    pub lifetime: Lifetime,
    /// Index of the page currently holding focus, if any.
    pub active_page: Option<usize>,
}

impl GuiNamespace {
    fn new(name: impl Into<String>, lifetime: Lifetime) -> Self {
        Self {
            name: name.into(),
            pages: Vec::new(),
            data: BTreeMap::new(),
            pinned: false,
            lifetime,
            active_page: None,
        }
    }
}

/// A single-instant, immutable capture of the full stack.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StateSnapshot {
    /// Namespaces top-to-bottom (index 0 = foreground).
    pub namespaces: Vec<GuiNamespace>,
}

impl StateSnapshot {
    /// Number of namespaces captured.
    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    /// Whether the stack was empty.
    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// The client-visible surface: (name, pages, data) top-to-bottom.
    ///
    /// Pinned flags and lifetimes are server-side bookkeeping and never
    /// cross the wire, so they are excluded from visibility comparisons.
    pub fn surface(&self) -> Vec<(String, Vec<String>, BTreeMap<String, Value>)> {
        self.namespaces
            .iter()
            .map(|ns| (ns.name.clone(), ns.pages.clone(), ns.data.clone()))
            .collect()
    }
}

/// The ordered namespace stack. Index 0 is the foreground surface.
#[derive(Debug)]
pub struct StateModel {
    stack: Vec<GuiNamespace>,
    precedence: PinnedPrecedence,
}

impl StateModel {
    /// Create an empty stack with the given pinned-precedence policy.
    pub fn new(precedence: PinnedPrecedence) -> Self {
        Self {
            stack: Vec::new(),
            precedence,
        }
    }

    /// Number of namespaces in the stack.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Whether the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Stack position of a namespace, if present.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.stack.iter().position(|ns| ns.name == name)
    }

    /// Borrow a namespace by name.
    pub fn get(&self, name: &str) -> Option<&GuiNamespace> {
        self.stack.iter().find(|ns| ns.name == name)
    }

    /// Name of the foreground namespace, if any.
    pub fn top_name(&self) -> Option<&str> {
        self.stack.first().map(|ns| ns.name.as_str())
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut GuiNamespace> {
        self.stack.iter_mut().find(|ns| ns.name == name)
    }

    /// Where an activated namespace lands, honoring the pinned policy.
    fn activation_target(&self, name: &str) -> usize {
        match self.precedence {
            PinnedPrecedence::Displaceable => 0,
            PinnedPrecedence::Anchored => match self.stack.first() {
                Some(top) if top.pinned && top.name != name => 1,
                _ => 0,
            },
        }
    }

    /// Insert a namespace if absent, otherwise raise it. Either way it ends
    /// up at its activation target position.
    pub fn upsert_namespace(&mut self, name: &str, lifetime: Lifetime) -> Vec<GuiMessage> {
        if self.position_of(name).is_some() {
            return self.move_to_top(name);
        }

        let position = self.stack.len();
        self.stack.push(GuiNamespace::new(name, lifetime));
        let mut messages = vec![GuiMessage::NamespaceInsert {
            namespace: name.to_string(),
            position,
        }];
        messages.extend(self.move_to_top(name));
        self.enforce_invariants();
        messages
    }

    /// Move a namespace to its activation target (usually position 0),
    /// preserving the relative order of everything else.
    ///
    /// Absent namespace or already-in-place are no-ops.
    pub fn move_to_top(&mut self, name: &str) -> Vec<GuiMessage> {
        let Some(from) = self.position_of(name) else {
            return Vec::new();
        };
        let to = self.activation_target(name).min(self.stack.len() - 1);
        if from == to {
            return Vec::new();
        }
        let ns = self.stack.remove(from);
        self.stack.insert(to, ns);
        vec![GuiMessage::NamespaceMove {
            namespace: name.to_string(),
            from,
            to,
        }]
    }

    /// Remove a namespace. Removing an absent one is a no-op.
    pub fn remove_namespace(&mut self, name: &str) -> Vec<GuiMessage> {
        let Some(position) = self.position_of(name) else {
            return Vec::new();
        };
        drop(self.stack.remove(position));
        vec![GuiMessage::NamespaceRemove {
            namespace: name.to_string(),
            position,
        }]
    }

    /// Insert a page, creating (and activating) the namespace if absent.
    /// `index` is clamped to the page sequence; `None` appends.
    pub fn insert_page(
        &mut self,
        namespace: &str,
        page: &str,
        index: Option<usize>,
        lifetime: Lifetime,
    ) -> Vec<GuiMessage> {
        let mut messages = if self.position_of(namespace).is_none() {
            self.upsert_namespace(namespace, lifetime)
        } else {
            Vec::new()
        };

        // upsert_namespace just created it, so this always finds one
        let Some(ns) = self.get_mut(namespace) else {
            return messages;
        };
        let position = index.unwrap_or(ns.pages.len()).min(ns.pages.len());
        ns.pages.insert(position, page.to_string());
        if let Some(active) = ns.active_page.as_mut() {
            if position <= *active {
                *active += 1;
            }
        }
        messages.push(GuiMessage::PageInsert {
            namespace: namespace.to_string(),
            page: page.to_string(),
            position,
        });
        self.enforce_invariants();
        messages
    }

    /// Remove the first occurrence of a page. Emptying an unpinned
    /// namespace removes the namespace in the same mutation step.
    /// Unknown namespace or page is a no-op.
    pub fn remove_page(&mut self, namespace: &str, page: &str) -> Vec<GuiMessage> {
        let Some(ns) = self.get_mut(namespace) else {
            return Vec::new();
        };
        let Some(position) = ns.pages.iter().position(|p| p == page) else {
            return Vec::new();
        };
        drop(ns.pages.remove(position));
        ns.active_page = match ns.active_page {
            Some(active) if active == position => None,
            Some(active) if active > position => Some(active - 1),
            other => other,
        };
        let emptied = ns.pages.is_empty() && !ns.pinned;

        let mut messages = vec![GuiMessage::PageRemove {
            namespace: namespace.to_string(),
            page: page.to_string(),
            position,
        }];
        if emptied {
            messages.extend(self.remove_namespace(namespace));
        }
        messages
    }

    /// Write a session-data binding (last-write-wins). Creates the
    /// namespace at the bottom of the stack if absent — data may exist
    /// before any page does, without stealing the foreground. Reserved
    /// keys are dropped.
    pub fn set_value(
        &mut self,
        namespace: &str,
        key: &str,
        value: Value,
        lifetime: Lifetime,
    ) -> Vec<GuiMessage> {
        if RESERVED_KEYS.contains(&key) {
            return Vec::new();
        }

        let mut messages = Vec::new();
        if self.position_of(namespace).is_none() {
            let position = self.stack.len();
            self.stack.push(GuiNamespace::new(namespace, lifetime));
            messages.push(GuiMessage::NamespaceInsert {
                namespace: namespace.to_string(),
                position,
            });
        }
        if let Some(ns) = self.get_mut(namespace) {
            let _ = ns.data.insert(key.to_string(), value.clone());
        }
        messages.push(GuiMessage::ValueSet {
            namespace: namespace.to_string(),
            key: key.to_string(),
            value,
        });
        self.enforce_invariants();
        messages
    }

    /// Delete a session-data binding. Unknown namespace or key is a no-op.
    pub fn delete_value(&mut self, namespace: &str, key: &str) -> Vec<GuiMessage> {
        let Some(ns) = self.get_mut(namespace) else {
            return Vec::new();
        };
        if ns.data.remove(key).is_none() {
            return Vec::new();
        }
        vec![GuiMessage::ValueDelete {
            namespace: namespace.to_string(),
            key: key.to_string(),
        }]
    }

    /// Set or clear a namespace's pinned flag. Pinning is server-side
    /// bookkeeping and emits nothing. Returns false if the namespace is
    /// absent or the flag already had that value.
    pub fn set_pinned(&mut self, name: &str, pinned: bool) -> bool {
        match self.get_mut(name) {
            Some(ns) if ns.pinned != pinned => {
                ns.pinned = pinned;
                true
            }
            _ => false,
        }
    }

    /// Change a namespace's lifetime policy. Returns false if the
    /// namespace is absent or already had that lifetime.
    pub fn set_lifetime(&mut self, name: &str, lifetime: Lifetime) -> bool {
        match self.get_mut(name) {
            Some(ns) if ns.lifetime != lifetime => {
                ns.lifetime = lifetime;
                true
            }
            _ => false,
        }
    }

    /// Record which page holds focus. Returns the page's position, or
    /// `None` if the namespace or page is unknown.
    pub fn set_active_page(&mut self, namespace: &str, page: &str) -> Option<usize> {
        let ns = self.get_mut(namespace)?;
        let position = ns.pages.iter().position(|p| p == page)?;
        ns.active_page = Some(position);
        Some(position)
    }

    /// Back navigation: remove the focused page and focus the one before
    /// it. A namespace with no focus, or focused on its first page, stays
    /// as it is.
    ///
    /// Returns the removal message plus the newly focused page and its
    /// position. The namespace can never be emptied by this (the focused
    /// index is > 0, so at least one page remains).
    pub fn back_page(&mut self, namespace: &str) -> Option<(GuiMessage, String, usize)> {
        let ns = self.get_mut(namespace)?;
        let active = ns.active_page?;
        if active == 0 {
            return None;
        }
        let page = ns.pages.remove(active);
        let focus = active - 1;
        ns.active_page = Some(focus);
        let focus_page = ns.pages[focus].clone();
        Some((
            GuiMessage::PageRemove {
                namespace: namespace.to_string(),
                page,
                position: active,
            },
            focus_page,
            focus,
        ))
    }

    /// Point-in-time immutable capture of the whole stack.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            namespaces: self.stack.clone(),
        }
    }

    /// Defensive self-heal: drop duplicate names, keeping the occurrence
    /// closest to the top. Unreachable through the public API; if it ever
    /// fires, the structure is repaired rather than crashing the service.
    /// Returns true if anything was repaired.
    pub fn enforce_invariants(&mut self) -> bool {
        let mut seen: Vec<String> = Vec::with_capacity(self.stack.len());
        let before = self.stack.len();
        self.stack.retain(|ns| {
            if seen.iter().any(|s| s == &ns.name) {
                false
            } else {
                seen.push(ns.name.clone());
                true
            }
        });
        let healed = self.stack.len() != before;
        if healed {
            error!(
                dropped = before - self.stack.len(),
                "duplicate namespace detected, self-healed by keeping topmost"
            );
        }
        healed
    }
}

impl Default for StateModel {
    fn default() -> Self {
        Self::new(PinnedPrecedence::Displaceable)
    }
}
