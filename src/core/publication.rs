// Publication state is a pure function of the version's dates and the clock.
// No status column exists anywhere in the engine; anything that looks like a
// stored status in source data is a legacy shadow and is ignored.

use chrono::{DateTime, Utc};

use crate::models::PageVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStatus {
    Draft,
    Published,
    Expired,
}

pub struct PublicationClock;

impl PublicationClock {
    /// Exactly one status holds for any `(effective, expiry, now)` triple.
    pub fn status(
        effective_date: Option<DateTime<Utc>>,
        expiry_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> VersionStatus {
        match effective_date {
            None => VersionStatus::Draft,
            Some(effective) if effective > now => VersionStatus::Draft,
            Some(_) => match expiry_date {
                Some(expiry) if expiry <= now => VersionStatus::Expired,
                _ => VersionStatus::Published,
            },
        }
    }

    pub fn version_status(version: &PageVersion, now: DateTime<Utc>) -> VersionStatus {
        Self::status(version.effective_date, version.expiry_date, now)
    }

    /// The published version with the highest version number, or None. The
    /// editorial workflow should keep windows disjoint, but the clock does
    /// not rely on that: overlapping windows resolve to the newest version.
    pub fn current_published(
        versions: &[PageVersion],
        now: DateTime<Utc>,
    ) -> Option<&PageVersion> {
        versions
            .iter()
            .filter(|v| Self::version_status(v, now) == VersionStatus::Published)
            .max_by_key(|v| v.version_number)
    }

    /// Highest version number regardless of status (editor view).
    pub fn latest(versions: &[PageVersion]) -> Option<&PageVersion> {
        versions.iter().max_by_key(|v| v.version_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn version(number: i64, effective: Option<i64>, expiry: Option<i64>) -> PageVersion {
        PageVersion {
            id: number,
            page_id: 1,
            version_number: number,
            effective_date: effective.map(at),
            expiry_date: expiry.map(at),
            widgets: Vec::new(),
            page_data: serde_json::json!({}),
            layout: None,
            theme: None,
            created_by: "test".to_string(),
            created_at: at(0),
        }
    }

    #[test]
    fn null_effective_is_draft() {
        assert_eq!(
            PublicationClock::status(None, None, at(100)),
            VersionStatus::Draft
        );
        assert_eq!(
            PublicationClock::status(None, Some(at(50)), at(100)),
            VersionStatus::Draft
        );
    }

    #[test]
    fn future_effective_is_draft() {
        assert_eq!(
            PublicationClock::status(Some(at(200)), None, at(100)),
            VersionStatus::Draft
        );
    }

    #[test]
    fn past_expiry_is_expired() {
        assert_eq!(
            PublicationClock::status(Some(at(10)), Some(at(100)), at(100)),
            VersionStatus::Expired
        );
        assert_eq!(
            PublicationClock::status(Some(at(10)), Some(at(50)), at(100)),
            VersionStatus::Expired
        );
    }

    #[test]
    fn inside_window_is_published() {
        assert_eq!(
            PublicationClock::status(Some(at(100)), None, at(100)),
            VersionStatus::Published
        );
        assert_eq!(
            PublicationClock::status(Some(at(10)), Some(at(200)), at(100)),
            VersionStatus::Published
        );
    }

    #[test]
    fn status_is_pure() {
        for _ in 0..3 {
            assert_eq!(
                PublicationClock::status(Some(at(10)), Some(at(200)), at(100)),
                VersionStatus::Published
            );
        }
    }

    #[test]
    fn current_published_prefers_highest_version_number() {
        // Overlapping windows: both v1 and v3 are live at t=100.
        let versions = vec![
            version(1, Some(10), None),
            version(3, Some(50), None),
            version(4, Some(500), None), // still draft at t=100
            version(2, Some(20), Some(90)), // expired
        ];
        let current = PublicationClock::current_published(&versions, at(100)).unwrap();
        assert_eq!(current.version_number, 3);
    }

    #[test]
    fn current_published_tolerates_no_match() {
        let versions = vec![version(1, None, None)];
        assert!(PublicationClock::current_published(&versions, at(100)).is_none());
        assert!(PublicationClock::current_published(&[], at(100)).is_none());
    }

    #[test]
    fn latest_ignores_status() {
        let versions = vec![version(2, Some(10), None), version(5, None, None)];
        assert_eq!(PublicationClock::latest(&versions).unwrap().version_number, 5);
    }
}
