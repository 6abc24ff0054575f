// Batch operations over the publication clock. Nothing here flips a status
// flag: status is derived, so the sweeps only observe and report transitions
// for audit and notification. Bulk operations stamp dates page by page; one
// bad page never takes the batch down.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::publication::{PublicationClock, VersionStatus};
use crate::error::{AppError, AppResult};
use crate::infrastructure::store::PageStore;
use crate::models::{PageId, PublicationSchedule, VersionId};
use crate::services::versions::VersionService;

/// Outcome of a due-publication/expiration sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub processed: usize,
    pub errors: Vec<SweepError>,
}

#[derive(Debug)]
pub struct SweepError {
    pub page_id: PageId,
    pub version_id: VersionId,
    pub message: String,
}

/// Outcome of a bulk publish/schedule. Per-page failures are collected, not
/// propagated; `count` is the number of pages that went through.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub count: usize,
    pub errors: Vec<(PageId, String)>,
}

#[derive(Clone)]
pub struct SchedulingService {
    store: Arc<dyn PageStore>,
    versions: VersionService,
}

impl SchedulingService {
    pub fn new(store: Arc<dyn PageStore>, versions: VersionService) -> Self {
        Self { store, versions }
    }

    /// Report versions whose effective date has passed and that are now the
    /// current published version of their page. Purely observational.
    pub async fn process_due_publications(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let due = self.store.versions_effective_before(now).await?;
        let mut report = SweepReport::default();

        // The scan is ordered by (page_id, version_number DESC); the first
        // Published version in each page group is the current one.
        let mut current_page: Option<PageId> = None;
        for version in &due {
            if current_page == Some(version.page_id) {
                continue;
            }
            match PublicationClock::version_status(version, now) {
                VersionStatus::Published => {
                    current_page = Some(version.page_id);
                    info!(
                        page_id = version.page_id,
                        version = version.version_number,
                        effective = ?version.effective_date,
                        "version is live"
                    );
                    report.processed += 1;
                }
                _ => {
                    // Expired or (pathologically) draft despite the date
                    // filter; a lower-numbered version may still be current.
                }
            }
        }
        Ok(report)
    }

    /// Report versions whose expiry date has passed.
    pub async fn process_due_expirations(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let due = self.store.versions_expiring_before(now).await?;
        let mut report = SweepReport::default();
        for version in &due {
            if PublicationClock::version_status(version, now) != VersionStatus::Expired {
                continue;
            }
            match self.store.versions(version.page_id).await {
                Ok(siblings) => {
                    let replacement = PublicationClock::current_published(&siblings, now);
                    info!(
                        page_id = version.page_id,
                        version = version.version_number,
                        replaced_by = ?replacement.map(|v| v.version_number),
                        "version expired"
                    );
                    report.processed += 1;
                }
                Err(e) => {
                    warn!(
                        page_id = version.page_id,
                        version_id = version.id,
                        error = %e,
                        "failed to inspect expired version's page"
                    );
                    report.errors.push(SweepError {
                        page_id: version.page_id,
                        version_id: version.id,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Publish each page's latest version immediately with no expiry. Pages
    /// without a version get an empty one. One transaction per page.
    pub async fn bulk_publish(&self, page_ids: &[PageId], editor: &str) -> AppResult<BatchReport> {
        let now = Utc::now();
        let schedule = PublicationSchedule::starting_at(now);
        let mut report = BatchReport::default();
        for &page_id in page_ids {
            match self.stamp_with_retry(page_id, schedule, editor).await {
                Ok(_) => report.count += 1,
                Err(e) => {
                    warn!(page_id, error = %e, "bulk publish failed for page");
                    report.errors.push((page_id, e.to_string()));
                }
            }
        }
        info!(
            requested = page_ids.len(),
            published = report.count,
            failed = report.errors.len(),
            "bulk publish finished"
        );
        Ok(report)
    }

    /// Stamp the same schedule onto each page's latest version. An internally
    /// invalid schedule rejects the whole batch before any write.
    pub async fn bulk_schedule(
        &self,
        page_ids: &[PageId],
        schedule: PublicationSchedule,
        editor: &str,
    ) -> AppResult<BatchReport> {
        schedule.validate().map_err(|e| match e {
            AppError::InvalidSchedule(msg) => {
                AppError::InvalidSchedule(format!("bulk schedule rejected: {}", msg))
            }
            other => other,
        })?;

        let mut report = BatchReport::default();
        for &page_id in page_ids {
            match self.stamp_with_retry(page_id, schedule, editor).await {
                Ok(_) => report.count += 1,
                Err(e) => {
                    warn!(page_id, error = %e, "bulk schedule failed for page");
                    report.errors.push((page_id, e.to_string()));
                }
            }
        }
        info!(
            requested = page_ids.len(),
            scheduled = report.count,
            failed = report.errors.len(),
            "bulk schedule finished"
        );
        Ok(report)
    }

    // One retry for write/write races with a concurrent editor; anything
    // else goes straight into the per-page error list.
    async fn stamp_with_retry(
        &self,
        page_id: PageId,
        schedule: PublicationSchedule,
        editor: &str,
    ) -> AppResult<()> {
        match self.versions.apply_schedule(page_id, schedule, editor).await {
            Err(e) if e.is_retryable() => {
                warn!(page_id, error = %e, "retrying page after transient conflict");
                self.versions.apply_schedule(page_id, schedule, editor).await?;
                Ok(())
            }
            Err(e) => Err(e),
            Ok(_) => Ok(()),
        }
    }

    /// Convenience for external periodic triggers: both sweeps at `now`.
    pub async fn run_sweeps(&self, now: DateTime<Utc>) -> AppResult<(SweepReport, SweepReport)> {
        let publications = self.process_due_publications(now).await?;
        let expirations = self.process_due_expirations(now).await?;
        Ok((publications, expirations))
    }
}
