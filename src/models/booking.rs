use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::NaiveDateTime;

use super::SessionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum BookingStatus {
    Signup,
    WaitingList,
    Cancelled,
}

impl BookingStatus {
    pub fn is_active(self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Signup => "signup",
            BookingStatus::WaitingList => "waiting_list",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum CancelledBy {
    User,
    Admin,
    System,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub member_id: i64,
    pub schedule_id: i64,
    pub package_id: Option<i64>,
    pub member_package_id: Option<i64>,
    pub credit_category: Option<SessionType>,
    pub status: BookingStatus,
    pub attendance: Option<String>,
    pub cancelled_by: Option<CancelledBy>,
    pub waitlist_joined_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    /// Waitlist order: join time, then creation time, then id for rows that
    /// predate the join timestamp.
    pub fn queue_key(&self) -> (NaiveDateTime, NaiveDateTime, i64) {
        (self.waitlist_joined_at.unwrap_or(self.created_at), self.created_at, self.id)
    }
}

/// Row to be inserted; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub member_id: i64,
    pub schedule_id: i64,
    pub package_id: i64,
    pub member_package_id: i64,
    pub credit_category: SessionType,
    pub status: BookingStatus,
    pub waitlist_joined_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// A time commitment on a given day, used for overlap checks. `id` is the
/// booking id for members and the schedule id for trainers.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Commitment {
    pub id: i64,
    pub schedule_id: i64,
    pub date_start: chrono::NaiveDate,
    pub time_start: chrono::NaiveTime,
    pub time_end: chrono::NaiveTime,
}
