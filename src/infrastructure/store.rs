// Persistence boundary. The engine talks to a `PageStore`; the bundled
// implementation is SQLite over sqlx. Version numbering happens inside a
// single write transaction so concurrent editors never mint the same number.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::{Page, PageId, PageVersion, VersionDraft, VersionId, Widget};

/// Fields for a new page row; slug policy has already been applied by the
/// page-tree service when this reaches the store.
#[derive(Debug, Clone)]
pub struct NewPageRow {
    pub parent_id: Option<PageId>,
    pub slug: String,
    pub sort_order: i64,
    pub hostnames: Vec<String>,
    pub code_layout: Option<String>,
    pub theme: Option<String>,
}

/// Transactional CRUD for pages and versions, with the indexed lookups the
/// resolver needs (by parent, by page).
#[async_trait]
pub trait PageStore: Send + Sync {
    // Page operations
    async fn insert_page(&self, row: NewPageRow) -> AppResult<Page>;
    async fn get_page(&self, id: PageId) -> AppResult<Option<Page>>;
    /// Children ordered by sort_order then id. Soft-deleted children are
    /// excluded unless `include_deleted` is set.
    async fn children(&self, parent_id: Option<PageId>, include_deleted: bool)
        -> AppResult<Vec<Page>>;
    /// Slugs of live (non-deleted) pages sharing `parent_id`.
    async fn sibling_slugs(&self, parent_id: Option<PageId>) -> AppResult<Vec<String>>;
    async fn update_page(&self, page: &Page) -> AppResult<()>;
    async fn set_deleted(&self, id: PageId, deleted: bool) -> AppResult<()>;
    /// Hard delete: removes the page row and all of its versions.
    async fn delete_page(&self, id: PageId) -> AppResult<bool>;

    // Version operations
    /// Insert a new version with the next version_number for the page,
    /// assigned race-free within one write transaction.
    async fn insert_version(
        &self,
        page_id: PageId,
        draft: &VersionDraft,
        created_by: &str,
    ) -> AppResult<PageVersion>;
    async fn get_version(&self, id: VersionId) -> AppResult<Option<PageVersion>>;
    /// All versions of a page, highest version_number first.
    async fn versions(&self, page_id: PageId) -> AppResult<Vec<PageVersion>>;
    async fn latest_version(&self, page_id: PageId) -> AppResult<Option<PageVersion>>;
    /// Overwrite content of an existing version row.
    async fn update_version(&self, version: &PageVersion) -> AppResult<()>;
    async fn set_version_dates(
        &self,
        id: VersionId,
        effective_date: Option<DateTime<Utc>>,
        expiry_date: Option<DateTime<Utc>>,
    ) -> AppResult<()>;
    /// Versions whose effective_date is at or before `at` (sweep input).
    async fn versions_effective_before(&self, at: DateTime<Utc>) -> AppResult<Vec<PageVersion>>;
    /// Versions whose expiry_date is at or before `at` (sweep input).
    async fn versions_expiring_before(&self, at: DateTime<Utc>) -> AppResult<Vec<PageVersion>>;
}

/// SQLite implementation of the page store.
pub struct SqlitePageStore {
    pool: SqlitePool,
}

impl SqlitePageStore {
    pub async fn new(database_url: &str) -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to SQLite: {}", e)))?;
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// In-memory store for tests and embedding. A single connection keeps
    /// every handle on the same memory database and serializes writers.
    pub async fn new_in_memory() -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to connect to in-memory SQLite: {}", e))
            })?;
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    pub async fn initialize(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT NOT NULL,
                parent_id INTEGER,
                sort_order INTEGER NOT NULL DEFAULT 0,
                hostnames TEXT NOT NULL DEFAULT '[]',
                code_layout TEXT,
                theme TEXT,
                deleted INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create pages table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS page_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                page_id INTEGER NOT NULL,
                version_number INTEGER NOT NULL,
                effective_date INTEGER,
                expiry_date INTEGER,
                widgets TEXT NOT NULL DEFAULT '[]',
                page_data TEXT NOT NULL DEFAULT '{}',
                layout TEXT,
                theme TEXT,
                created_by TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(page_id, version_number)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to create page_versions table: {}", e))
        })?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_pages_parent ON pages(parent_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create parent index: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_versions_page ON page_versions(page_id, version_number DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create version index: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_versions_effective ON page_versions(effective_date)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create effective index: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_versions_expiry ON page_versions(expiry_date)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create expiry index: {}", e)))?;

        Ok(())
    }

    fn page_from_row(row: &SqliteRow) -> AppResult<Page> {
        let hostnames_json: String = row.try_get("hostnames")?;
        let hostnames: Vec<String> = serde_json::from_str(&hostnames_json)
            .map_err(|e| AppError::DeserializationError(format!("hostnames: {}", e)))?;
        Ok(Page {
            id: row.try_get("id")?,
            slug: row.try_get("slug")?,
            parent_id: row.try_get("parent_id")?,
            sort_order: row.try_get("sort_order")?,
            hostnames,
            code_layout: row.try_get("code_layout")?,
            theme: row.try_get("theme")?,
            deleted: row.try_get::<i64, _>("deleted")? != 0,
            created_at: from_millis(row.try_get("created_at")?),
            updated_at: from_millis(row.try_get("updated_at")?),
        })
    }

    fn version_from_row(row: &SqliteRow) -> AppResult<PageVersion> {
        let widgets_json: String = row.try_get("widgets")?;
        let widgets: Vec<Widget> = serde_json::from_str(&widgets_json)
            .map_err(|e| AppError::DeserializationError(format!("widgets: {}", e)))?;
        let page_data_json: String = row.try_get("page_data")?;
        let page_data: serde_json::Value = serde_json::from_str(&page_data_json)
            .map_err(|e| AppError::DeserializationError(format!("page_data: {}", e)))?;
        Ok(PageVersion {
            id: row.try_get("id")?,
            page_id: row.try_get("page_id")?,
            version_number: row.try_get("version_number")?,
            effective_date: row
                .try_get::<Option<i64>, _>("effective_date")?
                .map(from_millis),
            expiry_date: row.try_get::<Option<i64>, _>("expiry_date")?.map(from_millis),
            widgets,
            page_data,
            layout: row.try_get("layout")?,
            theme: row.try_get("theme")?,
            created_by: row.try_get("created_by")?,
            created_at: from_millis(row.try_get("created_at")?),
        })
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

#[async_trait]
impl PageStore for SqlitePageStore {
    async fn insert_page(&self, row: NewPageRow) -> AppResult<Page> {
        let now = to_millis(Utc::now());
        let hostnames = serde_json::to_string(&row.hostnames)?;
        let result = sqlx::query(
            "INSERT INTO pages (slug, parent_id, sort_order, hostnames, code_layout, theme, deleted, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&row.slug)
        .bind(row.parent_id)
        .bind(row.sort_order)
        .bind(&hostnames)
        .bind(&row.code_layout)
        .bind(&row.theme)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to insert page: {}", e)))?;

        let id = result.last_insert_rowid();
        self.get_page(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Inserted page {} not readable", id)))
    }

    async fn get_page(&self, id: PageId) -> AppResult<Option<Page>> {
        let row = sqlx::query("SELECT * FROM pages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch page {}: {}", id, e)))?;
        row.as_ref().map(Self::page_from_row).transpose()
    }

    async fn children(
        &self,
        parent_id: Option<PageId>,
        include_deleted: bool,
    ) -> AppResult<Vec<Page>> {
        let deleted_clause = if include_deleted { "" } else { " AND deleted = 0" };
        let rows = match parent_id {
            Some(parent) => {
                let sql = format!(
                    "SELECT * FROM pages WHERE parent_id = ?{} ORDER BY sort_order, id",
                    deleted_clause
                );
                sqlx::query(&sql).bind(parent).fetch_all(&self.pool).await
            }
            None => {
                let sql = format!(
                    "SELECT * FROM pages WHERE parent_id IS NULL{} ORDER BY sort_order, id",
                    deleted_clause
                );
                sqlx::query(&sql).fetch_all(&self.pool).await
            }
        }
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch children: {}", e)))?;
        rows.iter().map(Self::page_from_row).collect()
    }

    async fn sibling_slugs(&self, parent_id: Option<PageId>) -> AppResult<Vec<String>> {
        let rows = match parent_id {
            Some(parent) => {
                sqlx::query("SELECT slug FROM pages WHERE parent_id = ? AND deleted = 0")
                    .bind(parent)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT slug FROM pages WHERE parent_id IS NULL AND deleted = 0")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch sibling slugs: {}", e)))?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("slug").map_err(AppError::from))
            .collect()
    }

    async fn update_page(&self, page: &Page) -> AppResult<()> {
        let now = to_millis(Utc::now());
        let hostnames = serde_json::to_string(&page.hostnames)?;
        let result = sqlx::query(
            "UPDATE pages SET slug = ?, parent_id = ?, sort_order = ?, hostnames = ?,
             code_layout = ?, theme = ?, deleted = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&page.slug)
        .bind(page.parent_id)
        .bind(page.sort_order)
        .bind(&hostnames)
        .bind(&page.code_layout)
        .bind(&page.theme)
        .bind(page.deleted as i64)
        .bind(now)
        .bind(page.id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update page {}: {}", page.id, e)))?;
        if result.rows_affected() == 0 {
            return Err(AppError::PageNotFound(format!("page {}", page.id)));
        }
        Ok(())
    }

    async fn set_deleted(&self, id: PageId, deleted: bool) -> AppResult<()> {
        let now = to_millis(Utc::now());
        let result = sqlx::query("UPDATE pages SET deleted = ?, updated_at = ? WHERE id = ?")
            .bind(deleted as i64)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to flag page {}: {}", id, e)))?;
        if result.rows_affected() == 0 {
            return Err(AppError::PageNotFound(format!("page {}", id)));
        }
        Ok(())
    }

    async fn delete_page(&self, id: PageId) -> AppResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to begin transaction: {}", e)))?;
        sqlx::query("DELETE FROM page_versions WHERE page_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete versions: {}", e)))?;
        let result = sqlx::query("DELETE FROM pages WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete page {}: {}", id, e)))?;
        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit delete: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_version(
        &self,
        page_id: PageId,
        draft: &VersionDraft,
        created_by: &str,
    ) -> AppResult<PageVersion> {
        let widgets = serde_json::to_string(&draft.widgets)?;
        let page_data = serde_json::to_string(
            draft
                .page_data
                .as_ref()
                .unwrap_or(&serde_json::Value::Object(serde_json::Map::new())),
        )?;

        // The max-read and insert share one write transaction; the unique
        // index on (page_id, version_number) backstops anything that slips
        // through. One retry, then the caller sees a retryable conflict.
        for attempt in 0..2 {
            let mut tx = self.pool.begin().await.map_err(|e| {
                AppError::DatabaseError(format!("Failed to begin transaction: {}", e))
            })?;

            let row = sqlx::query(
                "SELECT COALESCE(MAX(version_number), 0) AS max_version FROM page_versions WHERE page_id = ?",
            )
            .bind(page_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to read max version: {}", e)))?;
            let next_number: i64 = row.try_get::<i64, _>("max_version")? + 1;

            let now = to_millis(Utc::now());
            let insert = sqlx::query(
                "INSERT INTO page_versions (page_id, version_number, effective_date, expiry_date,
                 widgets, page_data, layout, theme, created_by, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(page_id)
            .bind(next_number)
            .bind(draft.effective_date.map(to_millis))
            .bind(draft.expiry_date.map(to_millis))
            .bind(&widgets)
            .bind(&page_data)
            .bind(&draft.layout)
            .bind(&draft.theme)
            .bind(created_by)
            .bind(now)
            .execute(&mut *tx)
            .await;

            match insert {
                Ok(result) => {
                    let id = result.last_insert_rowid();
                    tx.commit().await.map_err(|e| {
                        AppError::DatabaseError(format!("Failed to commit version: {}", e))
                    })?;
                    debug!(page_id, version_number = next_number, "created page version");
                    return self.get_version(id).await?.ok_or_else(|| {
                        AppError::Internal(format!("Inserted version {} not readable", id))
                    });
                }
                Err(e) if e.to_string().contains("UNIQUE") && attempt == 0 => {
                    // Lost the race for this number; re-read and retry once.
                    tx.rollback().await.ok();
                    continue;
                }
                Err(e) => {
                    tx.rollback().await.ok();
                    return Err(AppError::DatabaseError(format!(
                        "Failed to insert version: {}",
                        e
                    )));
                }
            }
        }
        Err(AppError::ConcurrentVersionConflict { page_id })
    }

    async fn get_version(&self, id: VersionId) -> AppResult<Option<PageVersion>> {
        let row = sqlx::query("SELECT * FROM page_versions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch version {}: {}", id, e)))?;
        row.as_ref().map(Self::version_from_row).transpose()
    }

    async fn versions(&self, page_id: PageId) -> AppResult<Vec<PageVersion>> {
        let rows = sqlx::query(
            "SELECT * FROM page_versions WHERE page_id = ? ORDER BY version_number DESC",
        )
        .bind(page_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch versions: {}", e)))?;
        rows.iter().map(Self::version_from_row).collect()
    }

    async fn latest_version(&self, page_id: PageId) -> AppResult<Option<PageVersion>> {
        let row = sqlx::query(
            "SELECT * FROM page_versions WHERE page_id = ? ORDER BY version_number DESC LIMIT 1",
        )
        .bind(page_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch latest version: {}", e)))?;
        row.as_ref().map(Self::version_from_row).transpose()
    }

    async fn update_version(&self, version: &PageVersion) -> AppResult<()> {
        let widgets = serde_json::to_string(&version.widgets)?;
        let page_data = serde_json::to_string(&version.page_data)?;
        let result = sqlx::query(
            "UPDATE page_versions SET effective_date = ?, expiry_date = ?, widgets = ?,
             page_data = ?, layout = ?, theme = ? WHERE id = ?",
        )
        .bind(version.effective_date.map(to_millis))
        .bind(version.expiry_date.map(to_millis))
        .bind(&widgets)
        .bind(&page_data)
        .bind(&version.layout)
        .bind(&version.theme)
        .bind(version.id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to update version {}: {}", version.id, e))
        })?;
        if result.rows_affected() == 0 {
            return Err(AppError::VersionNotFound(format!("version {}", version.id)));
        }
        Ok(())
    }

    async fn set_version_dates(
        &self,
        id: VersionId,
        effective_date: Option<DateTime<Utc>>,
        expiry_date: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let result =
            sqlx::query("UPDATE page_versions SET effective_date = ?, expiry_date = ? WHERE id = ?")
                .bind(effective_date.map(to_millis))
                .bind(expiry_date.map(to_millis))
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!("Failed to set dates on version {}: {}", id, e))
                })?;
        if result.rows_affected() == 0 {
            return Err(AppError::VersionNotFound(format!("version {}", id)));
        }
        Ok(())
    }

    async fn versions_effective_before(&self, at: DateTime<Utc>) -> AppResult<Vec<PageVersion>> {
        let rows = sqlx::query(
            "SELECT * FROM page_versions WHERE effective_date IS NOT NULL AND effective_date <= ?
             ORDER BY page_id, version_number DESC",
        )
        .bind(to_millis(at))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to scan due publications: {}", e)))?;
        rows.iter().map(Self::version_from_row).collect()
    }

    async fn versions_expiring_before(&self, at: DateTime<Utc>) -> AppResult<Vec<PageVersion>> {
        let rows = sqlx::query(
            "SELECT * FROM page_versions WHERE expiry_date IS NOT NULL AND expiry_date <= ?
             ORDER BY page_id, version_number DESC",
        )
        .bind(to_millis(at))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to scan due expirations: {}", e)))?;
        rows.iter().map(Self::version_from_row).collect()
    }
}
