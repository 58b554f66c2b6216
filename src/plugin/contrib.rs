//! UI contributions plugins can make.
//!
//! Plugins react to terminal signals by adding items to the activity
//! center, providing markdown content for item clicks, and requesting UI
//! actions (panels, sounds). The outer UI consumes [`HostAction`]s from the
//! registry's action channel; nothing here renders anything itself.

use serde::Serialize;

/// A section heading in the activity center dropdown.
#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub id: String,
    pub label: String,
    /// Lower priority sorts higher in the dropdown.
    pub priority: i32,
    pub can_dismiss_all: bool,
}

/// One entry under a section.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityItem {
    pub id: String,
    pub plugin_id: String,
    pub section_id: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Inline SVG, monochrome, `fill="currentColor"`.
    pub icon: String,
    #[serde(default)]
    pub icon_color: Option<String>,
    pub dismissible: bool,
    /// Opens a markdown tab via the matching provider when clicked.
    #[serde(default)]
    pub content_uri: Option<String>,
}

/// Fields of an [`ActivityItem`] that can be updated in place.
#[derive(Debug, Clone, Default)]
pub struct ActivityItemUpdate {
    pub title: Option<String>,
    pub subtitle: Option<Option<String>>,
    pub icon_color: Option<Option<String>>,
    pub content_uri: Option<Option<String>>,
}

/// Provides markdown content for `scheme:...` content URIs.
pub trait MarkdownProvider: Send + Sync {
    /// Return the markdown for a URI, or `None` when it has nothing to show.
    fn provide(&self, uri: &str) -> Option<String>;
}

/// UI actions requested by capability-holding plugins, consumed by the
/// outer UI from the registry's action channel.
#[derive(Debug, Clone)]
pub enum HostAction {
    OpenMarkdownPanel { title: String, content_uri: String },
    PlayNotificationSound,
    OpenPanel { id: String, title: String, html: String },
}
