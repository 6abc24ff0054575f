use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row id type for pages.
pub type PageId = i64;

/// A node in the page tree. Content lives in `PageVersion`; the page row only
/// carries structure (parent, slug, ordering) and page-level presentation
/// defaults that versions may override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub slug: String,
    pub parent_id: Option<PageId>,
    pub sort_order: i64,
    /// Hostnames this page answers to; only meaningful on root pages.
    pub hostnames: Vec<String>,
    /// Key into the external layout registry.
    pub code_layout: Option<String>,
    pub theme: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// How to handle a slug collision among siblings on create/update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlugConflictMode {
    /// Fail with `SlugConflict`.
    Reject,
    /// Probe `slug`, `slug-2`, `slug-3`, ... until unique.
    AutoRename,
}

/// Request payload for creating a page.
#[derive(Debug, Clone)]
pub struct CreatePage {
    pub parent_id: Option<PageId>,
    pub slug: String,
    pub sort_order: i64,
    pub hostnames: Vec<String>,
    pub code_layout: Option<String>,
    pub theme: Option<String>,
    pub slug_mode: SlugConflictMode,
    /// Slugs claimed by the caller's own in-flight batch, not yet committed.
    /// Auto-rename probes against these as well as committed sibling slugs.
    pub reserved_slugs: Vec<String>,
}

impl CreatePage {
    pub fn new(parent_id: Option<PageId>, slug: impl Into<String>) -> Self {
        Self {
            parent_id,
            slug: slug.into(),
            sort_order: 0,
            hostnames: Vec::new(),
            code_layout: None,
            theme: None,
            slug_mode: SlugConflictMode::AutoRename,
            reserved_slugs: Vec::new(),
        }
    }

    pub fn with_slug_mode(mut self, mode: SlugConflictMode) -> Self {
        self.slug_mode = mode;
        self
    }

    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.code_layout = Some(layout.into());
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    pub fn with_hostnames(mut self, hostnames: Vec<String>) -> Self {
        self.hostnames = hostnames;
        self
    }

    pub fn with_reserved_slugs(mut self, slugs: Vec<String>) -> Self {
        self.reserved_slugs = slugs;
        self
    }
}

/// Result of a create, reporting whether auto-rename kicked in.
#[derive(Debug, Clone)]
pub struct CreatedPage {
    pub page: Page,
    pub renamed: bool,
    pub requested_slug: String,
}
