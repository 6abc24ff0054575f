use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::page::PageId;
use super::version::Widget;

/// Which version the resolver reads per page in the ancestor chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolveView {
    /// Highest version number regardless of publication state (editor view).
    Latest,
    /// Current published version per the publication clock.
    PublishedNow,
}

/// Where an inherited widget was defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritedFrom {
    pub page_id: PageId,
    pub slug: String,
}

/// A widget as seen from a specific page, with inheritance provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetView {
    #[serde(flatten)]
    pub widget: Widget,
    pub is_inherited: bool,
    pub inherited_from: Option<InheritedFrom>,
    /// Distance to the defining page: 0 for the page's own widgets,
    /// 1 for the parent's, and so on.
    pub inheritance_depth: u32,
}

impl WidgetView {
    pub fn own(widget: Widget) -> Self {
        Self {
            widget,
            is_inherited: false,
            inherited_from: None,
            inheritance_depth: 0,
        }
    }

    pub fn inherited(widget: Widget, from: InheritedFrom, depth: u32) -> Self {
        Self {
            widget,
            is_inherited: true,
            inherited_from: Some(from),
            inheritance_depth: depth,
        }
    }
}

/// Per-slot resolution. `effective` is what renders; `raw_inherited` is the
/// untrimmed inherited list, kept around so editor UIs can show what a
/// replacement-only slot is overriding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotResolution {
    pub effective: Vec<WidgetView>,
    pub raw_inherited: Vec<WidgetView>,
    pub allow_merge: bool,
}

/// Fully resolved state of a page: effective layout, theme, and widgets per
/// slot. This is the engine's output; rendering it is someone else's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedPage {
    pub page_id: PageId,
    pub layout: String,
    pub theme: String,
    pub widgets_by_slot: BTreeMap<String, SlotResolution>,
}

impl ResolvedPage {
    /// Effective widgets for one slot; empty slice when the slot is empty.
    pub fn slot(&self, name: &str) -> &[WidgetView] {
        self.widgets_by_slot
            .get(name)
            .map(|s| s.effective.as_slice())
            .unwrap_or(&[])
    }
}
