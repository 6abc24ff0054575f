use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Validated `(effective_date, expiry_date)` pair used by scheduling and bulk
/// operations. A value object: never persisted as its own entity, only
/// stamped onto versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationSchedule {
    pub effective_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl PublicationSchedule {
    pub fn new(
        effective_date: Option<DateTime<Utc>>,
        expiry_date: Option<DateTime<Utc>>,
    ) -> AppResult<Self> {
        let schedule = Self {
            effective_date,
            expiry_date,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    /// Publish from `effective` with no expiry.
    pub fn starting_at(effective: DateTime<Utc>) -> Self {
        Self {
            effective_date: Some(effective),
            expiry_date: None,
        }
    }

    /// Internal consistency only: effective strictly before expiry when both set.
    pub fn validate(&self) -> AppResult<()> {
        if let (Some(effective), Some(expiry)) = (self.effective_date, self.expiry_date) {
            if effective >= expiry {
                return Err(AppError::InvalidSchedule(format!(
                    "effective_date {} must be before expiry_date {}",
                    effective, expiry
                )));
            }
        }
        Ok(())
    }

    /// Full validation for interactive scheduling: also rejects an effective
    /// date already in the past (publishing immediately is `bulk_publish`'s
    /// job, not `schedule`'s).
    pub fn validate_at(&self, now: DateTime<Utc>) -> AppResult<()> {
        self.validate()?;
        if let Some(effective) = self.effective_date {
            if effective < now {
                return Err(AppError::InvalidSchedule(format!(
                    "effective_date {} is in the past",
                    effective
                )));
            }
        }
        Ok(())
    }

    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        match self.effective_date {
            None => false,
            Some(effective) if effective > now => false,
            Some(_) => match self.expiry_date {
                Some(expiry) => expiry > now,
                None => true,
            },
        }
    }

    pub fn should_be_published_at(&self, at: DateTime<Utc>) -> bool {
        self.is_effective_at(at)
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expiry_date
            .filter(|expiry| *expiry > now)
            .map(|expiry| expiry - now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn rejects_effective_after_expiry() {
        assert!(PublicationSchedule::new(Some(at(200)), Some(at(100))).is_err());
        assert!(PublicationSchedule::new(Some(at(100)), Some(at(100))).is_err());
        assert!(PublicationSchedule::new(Some(at(100)), Some(at(200))).is_ok());
    }

    #[test]
    fn validate_at_rejects_past_effective() {
        let schedule = PublicationSchedule::new(Some(at(50)), None).unwrap();
        assert!(schedule.validate_at(at(100)).is_err());
        assert!(schedule.validate_at(at(10)).is_ok());
    }

    #[test]
    fn effective_window() {
        let schedule = PublicationSchedule::new(Some(at(100)), Some(at(200))).unwrap();
        assert!(!schedule.is_effective_at(at(99)));
        assert!(schedule.is_effective_at(at(100)));
        assert!(schedule.is_effective_at(at(199)));
        assert!(!schedule.is_effective_at(at(200)));
    }

    #[test]
    fn no_effective_date_is_never_effective() {
        let schedule = PublicationSchedule::new(None, Some(at(200))).unwrap();
        assert!(!schedule.is_effective_at(at(100)));
    }

    #[test]
    fn time_until_expiry_counts_down() {
        let schedule = PublicationSchedule::new(Some(at(100)), Some(at(200))).unwrap();
        assert_eq!(
            schedule.time_until_expiry(at(150)),
            Some(Duration::seconds(50))
        );
        assert_eq!(schedule.time_until_expiry(at(250)), None);
    }
}
