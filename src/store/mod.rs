//! Persistence seam of the booking core.
//!
//! The engine only reads catalog rows and writes bookings plus package
//! counters. `PgStore` backs the service; `MemoryStore` runs the same engine
//! in-process.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::error::StoreError;
use crate::models::{Booking, Commitment, CreditCounters, MemberPackage, NewBooking, Schedule, SessionType};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait BookingStore: Send + Sync {
    // === Schedules ===
    async fn schedule(&self, id: i64) -> StoreResult<Option<Schedule>>;

    /// Schedules whose start lies in `[from, to)`, ordered by start.
    async fn schedules_starting_between(&self, from: NaiveDateTime, to: NaiveDateTime) -> StoreResult<Vec<Schedule>>;

    /// Sets the auto-cancel resolution marker if it is still unset.
    /// Returns `false` when another evaluation already resolved the schedule.
    async fn mark_schedule_resolved(&self, id: i64, at: NaiveDateTime, cancelled: bool) -> StoreResult<bool>;

    /// Flags a not yet resolved schedule as auto-cancelled, closing it to new
    /// bookings while its existing ones are being cancelled.
    async fn flag_schedule_cancelled(&self, id: i64) -> StoreResult<()>;

    // === Commitments ===
    /// Signup and waiting-list bookings of the member on `date`.
    async fn member_commitments(&self, member_id: i64, date: NaiveDate) -> StoreResult<Vec<Commitment>>;

    /// Every schedule the trainer runs on `date`.
    async fn trainer_commitments(&self, trainer_id: i64, date: NaiveDate) -> StoreResult<Vec<Commitment>>;

    // === Ledger ===
    async fn member_packages(&self, member_id: i64) -> StoreResult<Vec<MemberPackage>>;

    async fn member_package(&self, id: i64) -> StoreResult<Option<MemberPackage>>;

    /// Funded category of every signup booking paid from the package.
    async fn funded_signup_categories(&self, member_package_id: i64) -> StoreResult<Vec<SessionType>>;

    async fn write_counters(&self, member_package_id: i64, counters: &CreditCounters) -> StoreResult<()>;

    /// Sets start/end only while the period is unset. Returns whether it was set.
    async fn stamp_package_period(&self, member_package_id: i64, start: NaiveDate, end: NaiveDate) -> StoreResult<bool>;

    // === Bookings ===
    async fn booking(&self, id: i64) -> StoreResult<Option<Booking>>;

    /// Most recent booking row of the member for the schedule, any status.
    async fn latest_booking(&self, member_id: i64, schedule_id: i64) -> StoreResult<Option<Booking>>;

    async fn schedule_bookings(&self, schedule_id: i64) -> StoreResult<Vec<Booking>>;

    async fn count_signups(&self, schedule_id: i64) -> StoreResult<i64>;

    /// Earliest queued waiting-list booking.
    async fn next_waitlisted(&self, schedule_id: i64) -> StoreResult<Option<Booking>>;

    async fn insert_booking(&self, booking: NewBooking) -> StoreResult<Booking>;

    async fn save_booking(&self, booking: &Booking) -> StoreResult<()>;

    /// Inserts and rewrites a batch of bookings atomically: either every row
    /// lands or none does.
    async fn apply_booking_batch(&self, inserts: Vec<NewBooking>, updates: Vec<Booking>) -> StoreResult<Vec<Booking>>;
}
