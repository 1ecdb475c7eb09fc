use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{BookingError, BookingResult};
use crate::models::Commitment;
use crate::store::BookingStore;

/// Whose calendar is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ConflictSubject {
    Member(i64),
    Trainer(i64),
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictReport {
    pub has_conflict: bool,
    pub conflicts: Vec<Commitment>,
}

/// Half-open interval overlap: touching slots (10:00-11:00, 11:00-12:00) do not clash.
pub fn overlaps(start: NaiveTime, end: NaiveTime, other_start: NaiveTime, other_end: NaiveTime) -> bool {
    start < other_end && other_start < end
}

pub fn find_overlaps(
    commitments: Vec<Commitment>,
    start: NaiveTime,
    end: NaiveTime,
    exclude_id: Option<i64>,
) -> Vec<Commitment> {
    commitments
        .into_iter()
        .filter(|c| Some(c.id) != exclude_id)
        .filter(|c| overlaps(start, end, c.time_start, c.time_end))
        .collect()
}

#[derive(Clone)]
pub struct ConflictValidator {
    store: Arc<dyn BookingStore>,
}

impl ConflictValidator {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    pub async fn has_conflict(
        &self,
        subject: ConflictSubject,
        date: NaiveDate,
        time_start: NaiveTime,
        time_end: NaiveTime,
        exclude_id: Option<i64>,
    ) -> BookingResult<ConflictReport> {
        if time_start >= time_end {
            return Err(BookingError::Validation("time_start must be before time_end".to_string()));
        }

        let commitments = match subject {
            ConflictSubject::Member(id) => self.store.member_commitments(id, date).await?,
            ConflictSubject::Trainer(id) => self.store.trainer_commitments(id, date).await?,
        };
        let conflicts = find_overlaps(commitments, time_start, time_end, exclude_id);

        Ok(ConflictReport {
            has_conflict: !conflicts.is_empty(),
            conflicts,
        })
    }

    /// Same check, but a clash becomes `BookingError::Conflict`.
    pub async fn ensure_free(
        &self,
        subject: ConflictSubject,
        date: NaiveDate,
        time_start: NaiveTime,
        time_end: NaiveTime,
        exclude_id: Option<i64>,
    ) -> BookingResult<()> {
        let report = self.has_conflict(subject, date, time_start, time_end, exclude_id).await?;
        if report.has_conflict {
            tracing::warn!("{:?} has {} conflicting commitment(s) on {}", subject, report.conflicts.len(), date);
            return Err(BookingError::Conflict { conflicts: report.conflicts });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn commitment(id: i64, start: NaiveTime, end: NaiveTime) -> Commitment {
        Commitment {
            id,
            schedule_id: id,
            date_start: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            time_start: start,
            time_end: end,
        }
    }

    #[test]
    fn adjacent_slots_do_not_overlap() {
        assert!(!overlaps(t(10, 0), t(11, 0), t(11, 0), t(12, 0)));
        assert!(!overlaps(t(11, 0), t(12, 0), t(10, 0), t(11, 0)));
    }

    #[test]
    fn partial_and_nested_slots_overlap() {
        assert!(overlaps(t(10, 0), t(11, 0), t(10, 30), t(11, 30)));
        assert!(overlaps(t(9, 0), t(12, 0), t(10, 0), t(11, 0)));
        assert!(overlaps(t(10, 0), t(11, 0), t(10, 0), t(11, 0)));
    }

    #[test]
    fn excluded_record_is_ignored() {
        let existing = vec![commitment(1, t(10, 0), t(11, 0)), commitment(2, t(10, 30), t(11, 30))];
        let found = find_overlaps(existing, t(10, 0), t(11, 0), Some(1));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 2);
    }
}
