//! # Host Page Contract
//!
//! The evaluation panel is injected into a third-party chat application. This
//! module defines the read-only view of that page the panel depends on, plus a
//! static in-memory implementation used by the CLI and by tests.

use crate::constants::{CLOSED_CONVERSATION_PHRASE, INFO_KEY_CONVERSATION_ID, INFO_KEY_SKILL};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// URL fragment of the chat application the panel is meant to run on.
pub const HOST_URL_MARKER: &str = "erp.maids.cc/chatcc";

/// A read-only view of the host page.
///
/// Implementations translate these queries into whatever the embedding
/// environment provides (DOM lookups in a browser, fixtures in tests). All
/// methods are synchronous and cheap; they are called from the page watch on
/// every poll tick.
pub trait HostPage: Send + Sync {
    /// Text of the signed-in user's badge, if present.
    fn user_badge(&self) -> Option<String>;

    /// Value of the client info item labelled `key` (e.g. `Skill`, `Conversation ID`).
    fn info_item(&self, key: &str) -> Option<String>;

    /// Whether the anchor element next to which the trigger button is placed exists.
    fn has_trigger_anchor(&self) -> bool;

    /// Whether the page's visible text contains `phrase`.
    fn text_contains(&self, phrase: &str) -> bool;

    /// Whether the panel's modal is still attached to the page.
    fn modal_attached(&self) -> bool;

    /// The page location.
    fn location(&self) -> String {
        String::new()
    }

    /// Whether the page shows the closed-conversation marker.
    fn is_conversation_closed(&self) -> bool {
        self.text_contains(CLOSED_CONVERSATION_PHRASE)
    }

    /// The current conversation id, or `""`.
    fn conversation_id(&self) -> String {
        self.info_item(INFO_KEY_CONVERSATION_ID)
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    }
}

// --- Static implementation ---

#[derive(Debug, Default)]
struct PageState {
    user_badge: Option<String>,
    info_items: HashMap<String, String>,
    trigger_anchor: bool,
    text: String,
    modal_attached: bool,
    location: String,
}

/// An in-memory [`HostPage`] whose contents can be changed at runtime.
#[derive(Debug, Default)]
pub struct StaticHostPage {
    state: Mutex<PageState>,
}

impl StaticHostPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A page for a closed conversation with the trigger anchor present.
    pub fn closed_conversation(user: &str, skill: &str, conversation_id: &str) -> Self {
        let page = Self::new();
        page.set_user(user);
        page.set_info(INFO_KEY_SKILL, skill);
        page.set_info(INFO_KEY_CONVERSATION_ID, conversation_id);
        page.set_text(CLOSED_CONVERSATION_PHRASE);
        page.set_trigger_anchor(true);
        page.set_location(&format!("https://{HOST_URL_MARKER}"));
        page
    }

    fn lock(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_user(&self, user: &str) {
        self.lock().user_badge = Some(user.to_string());
    }

    pub fn set_info(&self, key: &str, value: &str) {
        self.lock()
            .info_items
            .insert(key.to_string(), value.to_string());
    }

    pub fn set_text(&self, text: &str) {
        self.lock().text = text.to_string();
    }

    pub fn set_trigger_anchor(&self, present: bool) {
        self.lock().trigger_anchor = present;
    }

    pub fn set_modal_attached(&self, attached: bool) {
        self.lock().modal_attached = attached;
    }

    pub fn set_location(&self, location: &str) {
        self.lock().location = location.to_string();
    }
}

impl HostPage for StaticHostPage {
    fn user_badge(&self) -> Option<String> {
        self.lock().user_badge.clone()
    }

    fn info_item(&self, key: &str) -> Option<String> {
        self.lock().info_items.get(key).cloned()
    }

    fn has_trigger_anchor(&self) -> bool {
        self.lock().trigger_anchor
    }

    fn text_contains(&self, phrase: &str) -> bool {
        self.lock().text.contains(phrase)
    }

    fn modal_attached(&self) -> bool {
        self.lock().modal_attached
    }

    fn location(&self) -> String {
        self.lock().location.clone()
    }
}

// --- Diagnostics ---

/// A snapshot of which host-page markers the panel can see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub url_match: bool,
    pub target_anchor: bool,
    pub username: Option<String>,
    pub skill: Option<String>,
    pub conversation_id: Option<String>,
    pub is_closed: bool,
    pub already_rated: bool,
    pub metrics_count: usize,
}

impl Diagnostics {
    /// Whether the trigger button can be shown on this page.
    pub fn can_show_trigger(&self) -> bool {
        self.url_match && self.target_anchor
    }

    /// Human-readable reasons the trigger cannot be shown.
    pub fn problems(&self) -> Vec<&'static str> {
        let mut problems = Vec::new();
        if !self.url_match {
            problems.push("Wrong URL (not on the chat page)");
        }
        if !self.target_anchor {
            problems.push("Trigger anchor not found (page structure changed?)");
        }
        problems
    }
}

/// Inspects the host page. Session-derived fields are left at their defaults.
pub fn diagnose(host: &dyn HostPage) -> Diagnostics {
    let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    Diagnostics {
        url_match: host.location().contains(HOST_URL_MARKER),
        target_anchor: host.has_trigger_anchor(),
        username: non_empty(host.user_badge()),
        skill: non_empty(host.info_item(INFO_KEY_SKILL)),
        conversation_id: non_empty(host.info_item(INFO_KEY_CONVERSATION_ID)),
        is_closed: host.is_conversation_closed(),
        already_rated: false,
        metrics_count: 0,
    }
}
