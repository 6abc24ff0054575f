// Inheritance resolution: walks the ancestor chain and computes the
// effective layout, theme, and widgets-per-slot for a page. Inheritance is a
// read-time projection; descendants never copy ancestor widgets, they only
// see them here. Reads are lock-free against the store and go through the
// tree cache.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::core::publication::PublicationClock;
use crate::error::{AppError, AppResult};
use crate::infrastructure::registry::{default_allow_merge, LayoutDef, LayoutRegistry, ThemeDef};
use crate::infrastructure::store::PageStore;
use crate::infrastructure::tree_cache::TreeCache;
use crate::models::{
    InheritedFrom, Page, PageId, PageVersion, ResolveView, ResolvedPage, SlotResolution,
    WidgetView,
};

/// One page in the ancestor chain with the version the view selects for it.
struct ChainEntry {
    page: Page,
    version: Option<PageVersion>,
}

#[derive(Clone)]
pub struct InheritanceResolver {
    store: Arc<dyn PageStore>,
    cache: Arc<TreeCache>,
    registry: Arc<dyn LayoutRegistry>,
}

impl InheritanceResolver {
    pub fn new(
        store: Arc<dyn PageStore>,
        cache: Arc<TreeCache>,
        registry: Arc<dyn LayoutRegistry>,
    ) -> Self {
        Self {
            store,
            cache,
            registry,
        }
    }

    /// Effective state of a page. Privileged callers see latest versions;
    /// public callers see what the publication clock says is live at `now`.
    pub async fn resolve(
        &self,
        page_id: PageId,
        now: DateTime<Utc>,
        privileged: bool,
    ) -> AppResult<Arc<ResolvedPage>> {
        let view = if privileged {
            ResolveView::Latest
        } else {
            ResolveView::PublishedNow
        };
        self.cache
            .get_or_compute(page_id, view, now, || self.compute(page_id, now, privileged))
            .await
    }

    pub async fn resolve_layout(
        &self,
        page_id: PageId,
        now: DateTime<Utc>,
        privileged: bool,
    ) -> AppResult<LayoutDef> {
        let chain = self.load_chain(page_id, now, privileged).await?;
        Ok(self.effective_layout(&chain))
    }

    pub async fn resolve_theme(
        &self,
        page_id: PageId,
        now: DateTime<Utc>,
        privileged: bool,
    ) -> AppResult<ThemeDef> {
        let chain = self.load_chain(page_id, now, privileged).await?;
        Ok(self.effective_theme(&chain))
    }

    async fn compute(
        &self,
        page_id: PageId,
        now: DateTime<Utc>,
        privileged: bool,
    ) -> AppResult<ResolvedPage> {
        let chain = self.load_chain(page_id, now, privileged).await?;
        let layout = self.effective_layout(&chain);
        let theme = self.effective_theme(&chain);
        let widgets_by_slot = self.resolve_widgets(&chain, &layout);
        Ok(ResolvedPage {
            page_id,
            layout: layout.key,
            theme: theme.key,
            widgets_by_slot,
        })
    }

    /// Ancestor chain root-first, ending with the page itself, each entry
    /// paired with the version the view selects. A soft-deleted ancestor
    /// hides the whole branch, and the walk is visited-set guarded even
    /// though the tree invariant forbids cycles.
    async fn load_chain(
        &self,
        page_id: PageId,
        now: DateTime<Utc>,
        privileged: bool,
    ) -> AppResult<Vec<ChainEntry>> {
        let page = self
            .store
            .get_page(page_id)
            .await?
            .ok_or_else(|| AppError::PageNotFound(format!("page {}", page_id)))?;
        if page.deleted {
            return Err(AppError::PageNotFound(format!("page {} is deleted", page_id)));
        }

        let mut lineage = vec![page];
        let mut visited: HashSet<PageId> = HashSet::from([page_id]);
        let mut current = lineage[0].parent_id;
        while let Some(id) = current {
            if !visited.insert(id) {
                return Err(AppError::Internal(format!(
                    "cycle detected while resolving page {}",
                    page_id
                )));
            }
            let Some(ancestor) = self.store.get_page(id).await? else {
                // Dangling parent link; treat the chain as ending here.
                break;
            };
            if ancestor.deleted {
                return Err(AppError::PageNotFound(format!(
                    "page {} is in a soft-deleted branch",
                    page_id
                )));
            }
            current = ancestor.parent_id;
            lineage.push(ancestor);
        }
        lineage.reverse();

        let mut chain = Vec::with_capacity(lineage.len());
        for page in lineage {
            let versions = self.store.versions(page.id).await?;
            let version = if privileged {
                PublicationClock::latest(&versions).cloned()
            } else {
                PublicationClock::current_published(&versions, now).cloned()
            };
            chain.push(ChainEntry { page, version });
        }
        Ok(chain)
    }

    /// Version override beats the page default, nearest page beats ancestors,
    /// and a key the registry no longer knows falls back to the global
    /// default rather than failing.
    fn effective_layout(&self, chain: &[ChainEntry]) -> LayoutDef {
        for entry in chain.iter().rev() {
            let key = entry
                .version
                .as_ref()
                .and_then(|v| v.layout.clone())
                .or_else(|| entry.page.code_layout.clone());
            if let Some(key) = key {
                return self
                    .registry
                    .get_layout(&key)
                    .unwrap_or_else(|| self.registry.default_layout());
            }
        }
        self.registry.default_layout()
    }

    fn effective_theme(&self, chain: &[ChainEntry]) -> ThemeDef {
        for entry in chain.iter().rev() {
            let key = entry
                .version
                .as_ref()
                .and_then(|v| v.theme.clone())
                .or_else(|| entry.page.theme.clone());
            if let Some(key) = key {
                return self
                    .registry
                    .get_theme(&key)
                    .unwrap_or_else(|| self.registry.default_theme());
            }
        }
        self.registry.default_theme()
    }

    fn resolve_widgets(
        &self,
        chain: &[ChainEntry],
        layout: &LayoutDef,
    ) -> BTreeMap<String, SlotResolution> {
        let depth_of_self = chain.len().saturating_sub(1);

        // Inherited lists per slot, root-first. A nearer ancestor redefining
        // an id replaces the farther definition in place, keeping its slot
        // position.
        let mut inherited: BTreeMap<String, Vec<WidgetView>> = BTreeMap::new();
        for (idx, entry) in chain.iter().enumerate().take(depth_of_self) {
            let Some(version) = &entry.version else {
                continue;
            };
            let depth = (depth_of_self - idx) as u32;
            let from = InheritedFrom {
                page_id: entry.page.id,
                slug: entry.page.slug.clone(),
            };
            for widget in version.widgets.iter().filter(|w| w.inheritable) {
                let view = WidgetView::inherited(widget.clone(), from.clone(), depth);
                let slot = inherited.entry(widget.slot.clone()).or_default();
                match slot.iter_mut().find(|v| v.widget.id == widget.id) {
                    Some(existing) => *existing = view,
                    None => slot.push(view),
                }
            }
        }

        let mut own: BTreeMap<String, Vec<WidgetView>> = BTreeMap::new();
        if let Some(entry) = chain.last() {
            if let Some(version) = &entry.version {
                for widget in &version.widgets {
                    own.entry(widget.slot.clone())
                        .or_default()
                        .push(WidgetView::own(widget.clone()));
                }
            }
        }

        let mut slot_names: HashSet<String> = inherited.keys().cloned().collect();
        slot_names.extend(own.keys().cloned());
        slot_names.extend(layout.slots.iter().map(|s| s.name.clone()));

        let mut out = BTreeMap::new();
        for name in slot_names {
            let allow_merge = layout
                .slot(&name)
                .and_then(|s| s.allow_merge)
                .unwrap_or_else(|| default_allow_merge(&name));

            let mut raw_inherited = inherited.remove(&name).unwrap_or_default();
            let own_widgets = own.remove(&name).unwrap_or_default();

            let mut effective = if allow_merge {
                // Union: own widgets override inherited ones by id, taking
                // their slot position; new ids append.
                let mut merged = raw_inherited.clone();
                for view in own_widgets {
                    match merged.iter_mut().find(|v| v.widget.id == view.widget.id) {
                        Some(existing) => *existing = view,
                        None => merged.push(view),
                    }
                }
                merged
            } else if !own_widgets.is_empty() {
                // Replacement-only: any own widget suppresses the inherited
                // set for rendering; raw_inherited keeps it reachable.
                own_widgets
            } else {
                raw_inherited.clone()
            };

            sort_slot(&mut effective);
            sort_slot(&mut raw_inherited);

            if effective.is_empty() && raw_inherited.is_empty() && layout.slot(&name).is_none() {
                continue;
            }
            out.insert(
                name,
                SlotResolution {
                    effective,
                    raw_inherited,
                    allow_merge,
                },
            );
        }
        out
    }
}

/// Slot ordering: `order` first, then nearer definitions, then id so the
/// result is fully deterministic.
fn sort_slot(views: &mut [WidgetView]) {
    views.sort_by(|a, b| {
        a.widget
            .order
            .cmp(&b.widget.order)
            .then(a.inheritance_depth.cmp(&b.inheritance_depth))
            .then(a.widget.id.cmp(&b.widget.id))
    });
}
