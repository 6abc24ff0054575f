// Version lifecycle: create, edit-while-latest, publish, schedule. Content
// is validated here (widget schemas, slot ordering, date windows) before the
// store ever sees it; the store only guarantees race-free numbering.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::publication::{PublicationClock, VersionStatus};
use crate::error::{AppError, AppResult};
use crate::infrastructure::registry::WidgetTypeRegistry;
use crate::infrastructure::store::PageStore;
use crate::infrastructure::tree_cache::TreeCache;
use crate::models::{PageId, PageVersion, PublicationSchedule, VersionDraft, VersionId};

#[derive(Clone)]
pub struct VersionService {
    store: Arc<dyn PageStore>,
    cache: Arc<TreeCache>,
    widget_types: Arc<WidgetTypeRegistry>,
}

impl VersionService {
    pub fn new(
        store: Arc<dyn PageStore>,
        cache: Arc<TreeCache>,
        widget_types: Arc<WidgetTypeRegistry>,
    ) -> Self {
        Self {
            store,
            cache,
            widget_types,
        }
    }

    /// Save a new version for the page with the next version number.
    /// Descendants may inherit from this page, so the whole subtree's cached
    /// resolution is dropped.
    pub async fn create_version(
        &self,
        page_id: PageId,
        editor: &str,
        draft: VersionDraft,
    ) -> AppResult<PageVersion> {
        let page = self
            .store
            .get_page(page_id)
            .await?
            .ok_or_else(|| AppError::PageNotFound(format!("page {}", page_id)))?;
        if page.deleted {
            return Err(AppError::PageNotFound(format!("page {} is deleted", page_id)));
        }
        self.validate_draft(&draft)?;

        let version = self.store.insert_version(page_id, &draft, editor).await?;
        info!(
            page_id,
            version = version.version_number,
            editor,
            "created version"
        );
        self.cache.invalidate_subtree(page_id).await;
        Ok(version)
    }

    /// Overwrite the content of a version. Only the latest version of a page
    /// is writable; superseded versions are immutable history.
    pub async fn update_draft(
        &self,
        version_id: VersionId,
        draft: VersionDraft,
    ) -> AppResult<PageVersion> {
        let mut version = self.get_version(version_id).await?;
        let latest = self
            .store
            .latest_version(version.page_id)
            .await?
            .ok_or_else(|| AppError::VersionNotFound(format!("version {}", version_id)))?;
        if latest.id != version.id {
            return Err(AppError::Validation(format!(
                "version {} is superseded by version_number {}; create a new version instead",
                version_id, latest.version_number
            )));
        }
        self.validate_draft(&draft)?;

        version.widgets = draft.widgets;
        if let Some(page_data) = draft.page_data {
            version.page_data = page_data;
        }
        version.layout = draft.layout;
        version.theme = draft.theme;
        version.effective_date = draft.effective_date;
        version.expiry_date = draft.expiry_date;
        self.store.update_version(&version).await?;
        self.cache.invalidate_subtree(version.page_id).await;
        Ok(version)
    }

    /// Publish immediately and indefinitely. Publishing an already-published
    /// version is reported, not silently absorbed, and superseded versions
    /// are immutable history here exactly as they are in `update_draft`.
    pub async fn publish_version(&self, version_id: VersionId) -> AppResult<PageVersion> {
        let now = Utc::now();
        let mut version = self.get_version(version_id).await?;
        let latest = self
            .store
            .latest_version(version.page_id)
            .await?
            .ok_or_else(|| AppError::VersionNotFound(format!("version {}", version_id)))?;
        if latest.id != version.id {
            return Err(AppError::Validation(format!(
                "version {} is superseded by version_number {}; publish the latest version instead",
                version_id, latest.version_number
            )));
        }
        if PublicationClock::version_status(&version, now) == VersionStatus::Published {
            return Err(AppError::AlreadyPublished { version_id });
        }
        version.effective_date = Some(now);
        // A past expiry would make the publish a no-op; clear it.
        if version.expiry_date.is_some_and(|expiry| expiry <= now) {
            warn!(version_id, "clearing stale expiry_date on publish");
            version.expiry_date = None;
        }
        self.store
            .set_version_dates(version.id, version.effective_date, version.expiry_date)
            .await?;
        info!(
            page_id = version.page_id,
            version = version.version_number,
            "published version"
        );
        self.cache.invalidate_subtree(version.page_id).await;
        Ok(version)
    }

    /// Stamp a validated schedule onto the page's latest version, creating an
    /// empty first version if the page has none.
    pub async fn schedule(
        &self,
        page_id: PageId,
        schedule: PublicationSchedule,
        editor: &str,
    ) -> AppResult<PageVersion> {
        schedule.validate_at(Utc::now())?;
        self.apply_schedule(page_id, schedule, editor).await
    }

    /// Internal: stamp dates with no past-date guard (bulk publish sets
    /// effective = now deliberately).
    pub(crate) async fn apply_schedule(
        &self,
        page_id: PageId,
        schedule: PublicationSchedule,
        editor: &str,
    ) -> AppResult<PageVersion> {
        let mut version = match self.store.latest_version(page_id).await? {
            Some(version) => version,
            None => {
                let page_exists = self.store.get_page(page_id).await?.is_some();
                if !page_exists {
                    return Err(AppError::PageNotFound(format!("page {}", page_id)));
                }
                self.store
                    .insert_version(page_id, &VersionDraft::default(), editor)
                    .await?
            }
        };
        version.effective_date = schedule.effective_date;
        version.expiry_date = schedule.expiry_date;
        self.store
            .set_version_dates(version.id, version.effective_date, version.expiry_date)
            .await?;
        info!(
            page_id,
            version = version.version_number,
            effective = ?schedule.effective_date,
            expiry = ?schedule.expiry_date,
            "scheduled version"
        );
        self.cache.invalidate_subtree(page_id).await;
        Ok(version)
    }

    pub async fn get_version(&self, version_id: VersionId) -> AppResult<PageVersion> {
        self.store
            .get_version(version_id)
            .await?
            .ok_or_else(|| AppError::VersionNotFound(format!("version {}", version_id)))
    }

    /// All versions, newest first.
    pub async fn versions(&self, page_id: PageId) -> AppResult<Vec<PageVersion>> {
        self.store.versions(page_id).await
    }

    pub async fn latest(&self, page_id: PageId) -> AppResult<Option<PageVersion>> {
        self.store.latest_version(page_id).await
    }

    pub async fn current_published(
        &self,
        page_id: PageId,
        now: DateTime<Utc>,
    ) -> AppResult<Option<PageVersion>> {
        let versions = self.store.versions(page_id).await?;
        Ok(PublicationClock::current_published(&versions, now).cloned())
    }

    fn validate_draft(&self, draft: &VersionDraft) -> AppResult<()> {
        PublicationSchedule {
            effective_date: draft.effective_date,
            expiry_date: draft.expiry_date,
        }
        .validate()?;

        let mut seen_ids: HashSet<&str> = HashSet::new();
        let mut seen_orders: HashSet<(&str, i64)> = HashSet::new();
        for widget in &draft.widgets {
            self.widget_types.validate(widget)?;
            if !seen_ids.insert(widget.id.as_str()) {
                return Err(AppError::Validation(format!(
                    "duplicate widget id '{}' in version",
                    widget.id
                )));
            }
            if !seen_orders.insert((widget.slot.as_str(), widget.order)) {
                return Err(AppError::Validation(format!(
                    "duplicate order {} in slot '{}'",
                    widget.order, widget.slot
                )));
            }
        }
        Ok(())
    }
}
