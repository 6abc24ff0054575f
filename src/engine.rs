// Wiring. One storefront over the services for embedders and tests; the
// services remain usable on their own.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::{CacheConfig, Config};
use crate::error::AppResult;
use crate::infrastructure::registry::{InMemoryRegistry, LayoutRegistry, WidgetTypeRegistry};
use crate::infrastructure::store::{PageStore, SqlitePageStore};
use crate::infrastructure::tree_cache::TreeCache;
use crate::models::{
    PageId, PageVersion, PublicationSchedule, ResolvedPage, VersionDraft, VersionId,
};
use crate::services::page_tree::PageTreeService;
use crate::services::resolver::InheritanceResolver;
use crate::services::scheduling::{BatchReport, SchedulingService};
use crate::services::versions::VersionService;

pub struct PageEngine {
    pub store: Arc<dyn PageStore>,
    pub cache: Arc<TreeCache>,
    pub pages: PageTreeService,
    pub versions: VersionService,
    pub scheduling: SchedulingService,
    pub resolver: InheritanceResolver,
}

impl PageEngine {
    pub fn new(
        store: Arc<dyn PageStore>,
        cache_config: &CacheConfig,
        registry: Arc<dyn LayoutRegistry>,
        widget_types: Arc<WidgetTypeRegistry>,
    ) -> Self {
        let cache = Arc::new(TreeCache::new(Arc::clone(&store), cache_config));
        let pages = PageTreeService::new(Arc::clone(&store), Arc::clone(&cache));
        let versions =
            VersionService::new(Arc::clone(&store), Arc::clone(&cache), widget_types);
        let scheduling = SchedulingService::new(Arc::clone(&store), versions.clone());
        let resolver =
            InheritanceResolver::new(Arc::clone(&store), Arc::clone(&cache), registry);
        Self {
            store,
            cache,
            pages,
            versions,
            scheduling,
            resolver,
        }
    }

    /// Engine over the configured SQLite database, default registries.
    pub async fn from_config(config: &Config) -> AppResult<Self> {
        let store: Arc<dyn PageStore> =
            Arc::new(SqlitePageStore::new(&config.database.url).await?);
        Ok(Self::new(
            store,
            &config.cache,
            Arc::new(InMemoryRegistry::new()),
            Arc::new(WidgetTypeRegistry::permissive()),
        ))
    }

    /// In-memory engine for tests and embedding.
    pub async fn in_memory(
        registry: Arc<dyn LayoutRegistry>,
        widget_types: Arc<WidgetTypeRegistry>,
    ) -> AppResult<Self> {
        let store: Arc<dyn PageStore> = Arc::new(SqlitePageStore::new_in_memory().await?);
        Ok(Self::new(
            store,
            &CacheConfig::default(),
            registry,
            widget_types,
        ))
    }

    // Caller-facing operations, matching what the (external) API layer invokes.

    pub async fn resolve(
        &self,
        page_id: PageId,
        now: DateTime<Utc>,
        viewer_is_privileged: bool,
    ) -> AppResult<Arc<ResolvedPage>> {
        self.resolver.resolve(page_id, now, viewer_is_privileged).await
    }

    pub async fn create_version(
        &self,
        page_id: PageId,
        editor: &str,
        draft: VersionDraft,
    ) -> AppResult<PageVersion> {
        self.versions.create_version(page_id, editor, draft).await
    }

    pub async fn publish_version(&self, version_id: VersionId) -> AppResult<PageVersion> {
        self.versions.publish_version(version_id).await
    }

    pub async fn schedule(
        &self,
        page_id: PageId,
        schedule: PublicationSchedule,
        editor: &str,
    ) -> AppResult<PageVersion> {
        self.versions.schedule(page_id, schedule, editor).await
    }

    pub async fn bulk_publish(&self, page_ids: &[PageId], editor: &str) -> AppResult<BatchReport> {
        self.scheduling.bulk_publish(page_ids, editor).await
    }

    pub async fn bulk_schedule(
        &self,
        page_ids: &[PageId],
        schedule: PublicationSchedule,
        editor: &str,
    ) -> AppResult<BatchReport> {
        self.scheduling.bulk_schedule(page_ids, schedule, editor).await
    }
}
