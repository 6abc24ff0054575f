use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::page::PageId;

/// Row id type for page versions.
pub type VersionId = i64;

/// A snapshot of a page's content. Publication state is never stored; it is
/// derived from `effective_date`/`expiry_date` by the publication clock.
/// A version is mutable only while it is the latest for its page; once a
/// higher `version_number` exists it is frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageVersion {
    pub id: VersionId,
    pub page_id: PageId,
    /// Strictly increasing per page, assigned under a write transaction.
    pub version_number: i64,
    /// None means draft, never published.
    pub effective_date: Option<DateTime<Utc>>,
    /// Must be after `effective_date` when both are set.
    pub expiry_date: Option<DateTime<Utc>>,
    pub widgets: Vec<Widget>,
    pub page_data: serde_json::Value,
    /// Layout override; wins over the page-level `code_layout`.
    pub layout: Option<String>,
    /// Theme override; wins over the page-level theme.
    pub theme: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// A slot-scoped content unit inside a version. The id is stable across
/// edits and duplicates so descendants can override by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    pub widget_type: String,
    pub slot: String,
    pub order: i64,
    pub configuration: serde_json::Value,
    pub inheritable: bool,
}

impl Widget {
    pub fn new(widget_type: impl Into<String>, slot: impl Into<String>, order: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            widget_type: widget_type.into(),
            slot: slot.into(),
            order,
            configuration: serde_json::Value::Object(serde_json::Map::new()),
            inheritable: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_configuration(mut self, configuration: serde_json::Value) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn inheritable(mut self) -> Self {
        self.inheritable = true;
        self
    }
}

/// Editor-supplied content for a new version (or an edit of the latest one).
#[derive(Debug, Clone, Default)]
pub struct VersionDraft {
    pub widgets: Vec<Widget>,
    pub page_data: Option<serde_json::Value>,
    pub layout: Option<String>,
    pub theme: Option<String>,
    pub effective_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl VersionDraft {
    pub fn with_widgets(mut self, widgets: Vec<Widget>) -> Self {
        self.widgets = widgets;
        self
    }

    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = Some(layout.into());
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    pub fn with_page_data(mut self, page_data: serde_json::Value) -> Self {
        self.page_data = Some(page_data);
        self
    }

    pub fn effective_at(mut self, at: DateTime<Utc>) -> Self {
        self.effective_date = Some(at);
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expiry_date = Some(at);
        self
    }
}
