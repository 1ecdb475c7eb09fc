use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Session category. Doubles as the schedule type and as the credit bucket
/// a booking is funded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum SessionType {
    Group,
    SemiPrivate,
    Private,
}

impl SessionType {
    pub const ALL: [SessionType; 3] = [SessionType::Group, SessionType::SemiPrivate, SessionType::Private];

    /// Credit buckets that may fund a booking of this type, in the order
    /// they are drawn. Semi-private falls back to group, then private credit.
    pub fn credit_sources(self) -> &'static [SessionType] {
        match self {
            SessionType::Group => &[SessionType::Group],
            SessionType::SemiPrivate => &[SessionType::SemiPrivate, SessionType::Group, SessionType::Private],
            SessionType::Private => &[SessionType::Private],
        }
    }

    /// Private sessions run regardless of headcount.
    pub fn has_minimum_signup(self) -> bool {
        !matches!(self, SessionType::Private)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionType::Group => "group",
            SessionType::SemiPrivate => "semi_private",
            SessionType::Private => "private",
        }
    }
}

// Один экземпляр занятия (слот расписания)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Schedule {
    pub id: i64,
    pub trainer_id: i64,
    pub date_start: NaiveDate,
    pub time_start: NaiveTime,
    pub time_end: NaiveTime,
    #[serde(rename = "type")]
    pub session_type: SessionType,
    pub pax: i32,
    pub min_signup: i32,
    pub booking_deadline_hour: i32,
    pub cancel_buffer_minutes: i32,
    pub auto_cancel_checked_at: Option<NaiveDateTime>,
    pub auto_cancelled: bool,
}

impl Schedule {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date_start.and_time(self.time_start)
    }

    /// Last moment a new booking request is accepted.
    pub fn booking_closes_at(&self) -> NaiveDateTime {
        self.starts_at() - Duration::hours(i64::from(self.booking_deadline_hour))
    }

    /// Last moment a member may cancel; also the auto-cancel deadline.
    pub fn cancel_deadline(&self) -> NaiveDateTime {
        self.starts_at() - Duration::minutes(i64::from(self.cancel_buffer_minutes))
    }

    /// Whether the deadline scheduler should arm a timer for this instance at `now`.
    pub fn needs_deadline_timer(&self, now: NaiveDateTime) -> bool {
        self.session_type.has_minimum_signup()
            && self.starts_at() > now
            && self.cancel_deadline() > now
            && self.auto_cancel_checked_at.is_none()
    }
}
