#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::sync::{Arc, Mutex};

use studio_booking::models::{
    Booking, Commitment, CreditCounters, MemberPackage, NewBooking, Package, PackageType, Schedule, SessionType,
};
use studio_booking::services::notification::{
    Notification, NotificationChannel, NotificationError, NotificationEvent,
};
use studio_booking::services::{BookingEngine, Clock, ManualClock, NotificationDispatcher};
use studio_booking::store::{BookingStore, MemoryStore, StoreResult};

/// Keeps every notification it is handed.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingChannel {
    pub fn events_for(&self, booking_id: i64) -> Vec<NotificationEvent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.booking_id == booking_id)
            .map(|n| n.event)
            .collect()
    }

    pub fn count(&self, event: NotificationEvent) -> usize {
        self.sent.lock().unwrap().iter().filter(|n| n.event == event).count()
    }

    /// Notifications are spawned; give them a moment to land.
    pub async fn wait_for(&self, event: NotificationEvent, expected: usize) -> usize {
        for _ in 0..100 {
            if self.count(event) >= expected {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.count(event)
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Yields to the runtime after every ledger read, so concurrent requests
/// interleave between reading a balance and acting on it.
pub struct YieldingStore {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl BookingStore for YieldingStore {
    async fn schedule(&self, id: i64) -> StoreResult<Option<Schedule>> {
        self.inner.schedule(id).await
    }

    async fn schedules_starting_between(&self, from: NaiveDateTime, to: NaiveDateTime) -> StoreResult<Vec<Schedule>> {
        self.inner.schedules_starting_between(from, to).await
    }

    async fn mark_schedule_resolved(&self, id: i64, at: NaiveDateTime, cancelled: bool) -> StoreResult<bool> {
        self.inner.mark_schedule_resolved(id, at, cancelled).await
    }

    async fn flag_schedule_cancelled(&self, id: i64) -> StoreResult<()> {
        self.inner.flag_schedule_cancelled(id).await
    }

    async fn member_commitments(&self, member_id: i64, date: NaiveDate) -> StoreResult<Vec<Commitment>> {
        self.inner.member_commitments(member_id, date).await
    }

    async fn trainer_commitments(&self, trainer_id: i64, date: NaiveDate) -> StoreResult<Vec<Commitment>> {
        self.inner.trainer_commitments(trainer_id, date).await
    }

    async fn member_packages(&self, member_id: i64) -> StoreResult<Vec<MemberPackage>> {
        let packages = self.inner.member_packages(member_id).await;
        tokio::task::yield_now().await;
        packages
    }

    async fn member_package(&self, id: i64) -> StoreResult<Option<MemberPackage>> {
        let package = self.inner.member_package(id).await;
        tokio::task::yield_now().await;
        package
    }

    async fn funded_signup_categories(&self, member_package_id: i64) -> StoreResult<Vec<SessionType>> {
        let categories = self.inner.funded_signup_categories(member_package_id).await;
        tokio::task::yield_now().await;
        categories
    }

    async fn write_counters(&self, member_package_id: i64, counters: &CreditCounters) -> StoreResult<()> {
        self.inner.write_counters(member_package_id, counters).await
    }

    async fn stamp_package_period(&self, member_package_id: i64, start: NaiveDate, end: NaiveDate) -> StoreResult<bool> {
        self.inner.stamp_package_period(member_package_id, start, end).await
    }

    async fn booking(&self, id: i64) -> StoreResult<Option<Booking>> {
        self.inner.booking(id).await
    }

    async fn latest_booking(&self, member_id: i64, schedule_id: i64) -> StoreResult<Option<Booking>> {
        self.inner.latest_booking(member_id, schedule_id).await
    }

    async fn schedule_bookings(&self, schedule_id: i64) -> StoreResult<Vec<Booking>> {
        self.inner.schedule_bookings(schedule_id).await
    }

    async fn count_signups(&self, schedule_id: i64) -> StoreResult<i64> {
        self.inner.count_signups(schedule_id).await
    }

    async fn next_waitlisted(&self, schedule_id: i64) -> StoreResult<Option<Booking>> {
        self.inner.next_waitlisted(schedule_id).await
    }

    async fn insert_booking(&self, booking: NewBooking) -> StoreResult<Booking> {
        self.inner.insert_booking(booking).await
    }

    async fn save_booking(&self, booking: &Booking) -> StoreResult<()> {
        self.inner.save_booking(booking).await
    }

    async fn apply_booking_batch(&self, inserts: Vec<NewBooking>, updates: Vec<Booking>) -> StoreResult<Vec<Booking>> {
        self.inner.apply_booking_batch(inserts, updates).await
    }
}

pub struct Studio {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub engine: Arc<BookingEngine>,
    pub outbox: Arc<RecordingChannel>,
}

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, 5).unwrap()
}

pub fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// The morning before class day.
pub fn opening_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 5, 4).unwrap().and_hms_opt(8, 0, 0).unwrap()
}

impl Studio {
    pub fn new() -> Self {
        Self::with_recompute_attempts(3)
    }

    pub fn with_recompute_attempts(attempts: u32) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::build(store.clone(), store as Arc<dyn BookingStore>, attempts)
    }

    /// Engine runs on a store that yields after every ledger read.
    pub fn yielding() -> Self {
        let store = Arc::new(MemoryStore::new());
        let engine_store = Arc::new(YieldingStore { inner: store.clone() });
        Self::build(store, engine_store as Arc<dyn BookingStore>, 3)
    }

    fn build(store: Arc<MemoryStore>, engine_store: Arc<dyn BookingStore>, attempts: u32) -> Self {
        let clock = Arc::new(ManualClock::new(opening_time()));
        let outbox = Arc::new(RecordingChannel::default());
        let dispatcher = Arc::new(NotificationDispatcher::new(vec![outbox.clone() as Arc<dyn NotificationChannel>]));

        let engine = Arc::new(BookingEngine::new(engine_store, clock.clone(), dispatcher, attempts));

        Self { store, clock, engine, outbox }
    }

    pub fn class(&self, id: i64, session_type: SessionType, pax: i32, min_signup: i32) -> Schedule {
        self.class_at(id, session_type, pax, min_signup, hm(18, 0), hm(19, 0))
    }

    pub fn class_at(
        &self,
        id: i64,
        session_type: SessionType,
        pax: i32,
        min_signup: i32,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Schedule {
        let schedule = Schedule {
            id,
            trainer_id: 1,
            date_start: day(),
            time_start: start,
            time_end: end,
            session_type,
            pax,
            min_signup,
            booking_deadline_hour: 2,
            cancel_buffer_minutes: 90,
            auto_cancel_checked_at: None,
            auto_cancelled: false,
        };
        self.store.put_schedule(schedule.clone());
        schedule
    }

    pub fn grant(&self, member_id: i64, package_type: PackageType, group: i32, semi: i32, private: i32) -> i64 {
        self.store.grant_package(
            member_id,
            &Package {
                id: 100 + member_id,
                name: format!("{:?} for {}", package_type, member_id),
                package_type,
                group_sessions: group,
                semi_private_sessions: semi,
                private_sessions: private,
                duration_days: 30,
            },
        )
    }

    pub fn package(&self, member_package_id: i64) -> studio_booking::models::MemberPackage {
        self.store
            .all_member_packages()
            .into_iter()
            .find(|p| p.id == member_package_id)
            .unwrap()
    }

    pub fn clock_today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}
