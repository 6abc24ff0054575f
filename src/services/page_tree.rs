// Structural operations on the page tree: create, update, reparent, delete.
// Slug uniqueness and cycle prevention live here; every mutation invalidates
// the affected cache neighborhood before it returns.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::slug;
use crate::error::{AppError, AppResult};
use crate::infrastructure::store::{NewPageRow, PageStore};
use crate::infrastructure::tree_cache::TreeCache;
use crate::models::{CreatePage, CreatedPage, Page, PageId, SlugConflictMode};

/// Partial update of page structure/defaults. Content changes go through
/// versions, never through here.
#[derive(Debug, Clone, Default)]
pub struct UpdatePage {
    pub slug: Option<String>,
    pub sort_order: Option<i64>,
    pub hostnames: Option<Vec<String>>,
    pub code_layout: Option<Option<String>>,
    pub theme: Option<Option<String>>,
    pub slug_mode: Option<SlugConflictMode>,
}

#[derive(Clone)]
pub struct PageTreeService {
    store: Arc<dyn PageStore>,
    cache: Arc<TreeCache>,
}

impl PageTreeService {
    pub fn new(store: Arc<dyn PageStore>, cache: Arc<TreeCache>) -> Self {
        Self { store, cache }
    }

    pub async fn get_page(&self, page_id: PageId) -> AppResult<Page> {
        self.store
            .get_page(page_id)
            .await?
            .ok_or_else(|| AppError::PageNotFound(format!("page {}", page_id)))
    }

    pub async fn create_page(&self, req: CreatePage) -> AppResult<CreatedPage> {
        if let Some(parent_id) = req.parent_id {
            let parent = self.get_page(parent_id).await?;
            if parent.deleted {
                return Err(AppError::PageNotFound(format!(
                    "parent page {} is deleted",
                    parent_id
                )));
            }
        }

        let requested = slug::normalize(&req.slug);
        let final_slug = self
            .unique_slug(req.parent_id, &requested, None, req.slug_mode, &req.reserved_slugs)
            .await?;
        let renamed = final_slug != requested;

        let page = self
            .store
            .insert_page(NewPageRow {
                parent_id: req.parent_id,
                slug: final_slug.clone(),
                sort_order: req.sort_order,
                hostnames: req.hostnames,
                code_layout: req.code_layout,
                theme: req.theme,
            })
            .await?;

        if renamed {
            info!(page_id = page.id, from = %requested, to = %final_slug, "slug auto-renamed");
        }
        info!(page_id = page.id, slug = %page.slug, parent = ?page.parent_id, "created page");
        self.cache.invalidate_subtree(page.id).await;

        Ok(CreatedPage {
            page,
            renamed,
            requested_slug: requested,
        })
    }

    pub async fn update_page(&self, page_id: PageId, update: UpdatePage) -> AppResult<Page> {
        let mut page = self.get_page(page_id).await?;

        if let Some(raw) = update.slug {
            let requested = slug::normalize(&raw);
            if requested != page.slug {
                let mode = update.slug_mode.unwrap_or(SlugConflictMode::Reject);
                page.slug = self
                    .unique_slug(page.parent_id, &requested, Some(page_id), mode, &[])
                    .await?;
            }
        }
        if let Some(sort_order) = update.sort_order {
            page.sort_order = sort_order;
        }
        if let Some(hostnames) = update.hostnames {
            if page.parent_id.is_some() && !hostnames.is_empty() {
                warn!(page_id, "hostnames set on a non-root page are ignored at resolution");
            }
            page.hostnames = hostnames;
        }
        if let Some(code_layout) = update.code_layout {
            page.code_layout = code_layout;
        }
        if let Some(theme) = update.theme {
            page.theme = theme;
        }

        self.store.update_page(&page).await?;
        self.cache.invalidate_subtree(page_id).await;
        Ok(self.get_page(page_id).await?)
    }

    /// Move a page under a new parent. Fails with `CyclicParent` when the
    /// target is the page itself or one of its descendants; nothing is
    /// written in that case.
    pub async fn reparent(
        &self,
        page_id: PageId,
        new_parent_id: Option<PageId>,
        slug_mode: SlugConflictMode,
    ) -> AppResult<Page> {
        let mut page = self.get_page(page_id).await?;
        let old_parent_id = page.parent_id;

        if let Some(new_parent) = new_parent_id {
            if new_parent == page_id {
                return Err(AppError::CyclicParent {
                    page_id,
                    new_parent_id: new_parent,
                });
            }
            let descendants = self.descendants(page_id).await?;
            if descendants.iter().any(|d| d.id == new_parent) {
                return Err(AppError::CyclicParent {
                    page_id,
                    new_parent_id: new_parent,
                });
            }
            let parent = self.get_page(new_parent).await?;
            if parent.deleted {
                return Err(AppError::PageNotFound(format!(
                    "parent page {} is deleted",
                    new_parent
                )));
            }
        }

        let current_slug = page.slug.clone();
        page.slug = self
            .unique_slug(new_parent_id, &current_slug, Some(page_id), slug_mode, &[])
            .await?;
        page.parent_id = new_parent_id;
        self.store.update_page(&page).await?;
        info!(page_id, from = ?old_parent_id, to = ?new_parent_id, "reparented page");

        // Both neighborhoods change: the subtree carries its resolution
        // along, and the old and new ancestor chains stop/start feeding it.
        self.cache.invalidate_subtree(page_id).await;
        if let Some(old_parent) = old_parent_id {
            self.cache.invalidate_hierarchy(old_parent).await;
        }
        if let Some(new_parent) = new_parent_id {
            self.cache.invalidate_hierarchy(new_parent).await;
        }
        Ok(self.get_page(page_id).await?)
    }

    /// Ancestors of a page, root first, excluding the page itself.
    pub async fn ancestors(&self, page_id: PageId) -> AppResult<Vec<Page>> {
        let page = self.get_page(page_id).await?;
        let mut visited: HashSet<PageId> = HashSet::from([page_id]);
        let mut chain = Vec::new();
        let mut current = page.parent_id;
        while let Some(id) = current {
            if !visited.insert(id) {
                // The tree invariant forbids this; seeing it means the store
                // has corrupt parent links.
                return Err(AppError::Internal(format!(
                    "cycle detected in ancestor chain of page {}",
                    page_id
                )));
            }
            let ancestor = self.get_page(id).await?;
            current = ancestor.parent_id;
            chain.push(ancestor);
        }
        chain.reverse();
        Ok(chain)
    }

    /// All descendants of a page (excluding itself), soft-deleted included.
    pub async fn descendants(&self, page_id: PageId) -> AppResult<Vec<Page>> {
        let mut visited: HashSet<PageId> = HashSet::from([page_id]);
        let mut out = Vec::new();
        let mut queue = vec![page_id];
        while let Some(current) = queue.pop() {
            for child in self.store.children(Some(current), true).await? {
                if visited.insert(child.id) {
                    queue.push(child.id);
                    out.push(child);
                }
            }
        }
        Ok(out)
    }

    pub async fn children(&self, page_id: PageId) -> AppResult<Vec<Page>> {
        self.store.children(Some(page_id), false).await
    }

    pub async fn roots(&self) -> AppResult<Vec<Page>> {
        self.store.children(None, false).await
    }

    /// Soft delete: hides the page (and by extension its subtree) from slug
    /// uniqueness and resolution. Versions are retained.
    pub async fn soft_delete(&self, page_id: PageId) -> AppResult<()> {
        let page = self.get_page(page_id).await?;
        if page.deleted {
            return Ok(());
        }
        self.store.set_deleted(page_id, true).await?;
        info!(page_id, slug = %page.slug, "soft-deleted page");
        self.cache.invalidate_hierarchy(page_id).await;
        Ok(())
    }

    /// Undo a soft delete. The slug may have been taken in the meantime, in
    /// which case it is re-probed.
    pub async fn restore(&self, page_id: PageId) -> AppResult<Page> {
        let mut page = self.get_page(page_id).await?;
        if !page.deleted {
            return Ok(page);
        }
        let current_slug = page.slug.clone();
        page.slug = self
            .unique_slug(
                page.parent_id,
                &current_slug,
                Some(page_id),
                SlugConflictMode::AutoRename,
                &[],
            )
            .await?;
        page.deleted = false;
        self.store.update_page(&page).await?;
        info!(page_id, slug = %page.slug, "restored page");
        self.cache.invalidate_hierarchy(page_id).await;
        Ok(page)
    }

    /// Hard delete is reserved for soft-deleted leaves; anything referenced
    /// by children stays around.
    pub async fn hard_delete(&self, page_id: PageId) -> AppResult<()> {
        let page = self.get_page(page_id).await?;
        if !page.deleted {
            return Err(AppError::Validation(format!(
                "page {} must be soft-deleted before hard delete",
                page_id
            )));
        }
        let children = self.store.children(Some(page_id), true).await?;
        if !children.is_empty() {
            return Err(AppError::Validation(format!(
                "page {} still has {} children",
                page_id,
                children.len()
            )));
        }
        // Invalidate while the parent links still exist, then drop the rows.
        self.cache.invalidate_hierarchy(page_id).await;
        self.store.delete_page(page_id).await?;
        info!(page_id, "hard-deleted page");
        Ok(())
    }

    /// Walk a slash-separated path from the roots, e.g. `/docs/setup`.
    pub async fn page_by_path(&self, path: &str) -> AppResult<Page> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Err(AppError::PageNotFound("empty path".to_string()));
        }
        let mut parent: Option<PageId> = None;
        let mut found: Option<Page> = None;
        for segment in segments {
            let candidates = self.store.children(parent, false).await?;
            match candidates.into_iter().find(|p| p.slug == segment) {
                Some(page) => {
                    parent = Some(page.id);
                    found = Some(page);
                }
                None => {
                    return Err(AppError::PageNotFound(format!("path {}", path)));
                }
            }
        }
        found.ok_or_else(|| AppError::PageNotFound(format!("path {}", path)))
    }

    /// Root page answering to a hostname, for site routing.
    pub async fn find_root_by_hostname(&self, hostname: &str) -> AppResult<Option<Page>> {
        let roots = self.store.children(None, false).await?;
        Ok(roots
            .into_iter()
            .find(|p| p.hostnames.iter().any(|h| h == hostname)))
    }

    // Applies the slug policy against committed siblings plus the caller's
    // in-flight batch. `exclude` skips the page's own row on updates.
    async fn unique_slug(
        &self,
        parent_id: Option<PageId>,
        requested: &str,
        exclude: Option<PageId>,
        mode: SlugConflictMode,
        reserved: &[String],
    ) -> AppResult<String> {
        let mut taken: HashSet<String> = self
            .store
            .sibling_slugs(parent_id)
            .await?
            .into_iter()
            .collect();
        if let Some(exclude_id) = exclude {
            if let Some(own) = self.store.get_page(exclude_id).await? {
                if own.parent_id == parent_id {
                    taken.remove(&own.slug);
                }
            }
        }
        taken.extend(reserved.iter().map(|s| slug::normalize(s)));

        if !taken.contains(requested) {
            return Ok(requested.to_string());
        }
        match mode {
            SlugConflictMode::Reject => Err(AppError::SlugConflict {
                parent: parent_id,
                slug: requested.to_string(),
            }),
            SlugConflictMode::AutoRename => Ok(slug::probe_unique(requested, &taken)),
        }
    }
}
