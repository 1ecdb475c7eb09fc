use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{BookingStore, StoreResult};
use crate::error::StoreError;
use crate::models::{
    Booking, BookingStatus, Commitment, CreditCounters, MemberPackage, NewBooking, Package, Schedule, SessionType,
};

#[derive(Default)]
struct MemoryState {
    schedules: BTreeMap<i64, Schedule>,
    member_packages: BTreeMap<i64, MemberPackage>,
    bookings: BTreeMap<i64, Booking>,
    next_member_package_id: i64,
    next_booking_id: i64,
    failing_counter_writes: u32,
}

/// In-process store. Catalog rows are seeded directly since the core never
/// creates schedules or packages itself.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inserts or replaces a schedule, as the catalog layer would on create/update.
    pub fn put_schedule(&self, schedule: Schedule) {
        self.state().schedules.insert(schedule.id, schedule);
    }

    pub fn remove_schedule(&self, id: i64) -> Option<Schedule> {
        self.state().schedules.remove(&id)
    }

    /// Grants a package to a member with a full, unstarted ledger.
    pub fn grant_package(&self, member_id: i64, package: &Package) -> i64 {
        let mut state = self.state();
        state.next_member_package_id += 1;
        let id = state.next_member_package_id;
        state.member_packages.insert(
            id,
            MemberPackage {
                id,
                member_id,
                package_id: package.id,
                package_type: package.package_type,
                duration_days: package.duration_days,
                start_date: None,
                end_date: None,
                total_group: package.group_sessions,
                total_semi_private: package.semi_private_sessions,
                total_private: package.private_sessions,
                used_group: 0,
                remaining_group: package.group_sessions,
                used_semi_private: 0,
                remaining_semi_private: package.semi_private_sessions,
                used_private: 0,
                remaining_private: package.private_sessions,
            },
        );
        id
    }

    /// Overrides the period of a granted package, e.g. to seed one that is
    /// already running.
    pub fn set_package_period(&self, member_package_id: i64, start: NaiveDate, end: NaiveDate) {
        if let Some(mp) = self.state().member_packages.get_mut(&member_package_id) {
            mp.start_date = Some(start);
            mp.end_date = Some(end);
        }
    }

    pub fn all_bookings(&self) -> Vec<Booking> {
        self.state().bookings.values().cloned().collect()
    }

    pub fn all_member_packages(&self) -> Vec<MemberPackage> {
        self.state().member_packages.values().cloned().collect()
    }

    /// Makes the next `n` counter writes fail.
    pub fn fail_counter_writes(&self, n: u32) {
        self.state().failing_counter_writes = n;
    }

    fn commitment(booking_id: i64, schedule: &Schedule) -> Commitment {
        Commitment {
            id: booking_id,
            schedule_id: schedule.id,
            date_start: schedule.date_start,
            time_start: schedule.time_start,
            time_end: schedule.time_end,
        }
    }

    fn insert_locked(state: &mut MemoryState, new: NewBooking) -> Booking {
        state.next_booking_id += 1;
        let booking = Booking {
            id: state.next_booking_id,
            member_id: new.member_id,
            schedule_id: new.schedule_id,
            package_id: Some(new.package_id),
            member_package_id: Some(new.member_package_id),
            credit_category: Some(new.credit_category),
            status: new.status,
            attendance: None,
            cancelled_by: None,
            waitlist_joined_at: new.waitlist_joined_at,
            created_at: new.created_at,
            updated_at: new.created_at,
        };
        state.bookings.insert(booking.id, booking.clone());
        booking
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn schedule(&self, id: i64) -> StoreResult<Option<Schedule>> {
        Ok(self.state().schedules.get(&id).cloned())
    }

    async fn schedules_starting_between(&self, from: NaiveDateTime, to: NaiveDateTime) -> StoreResult<Vec<Schedule>> {
        let mut schedules: Vec<Schedule> = self
            .state()
            .schedules
            .values()
            .filter(|s| s.starts_at() >= from && s.starts_at() < to)
            .cloned()
            .collect();
        schedules.sort_by_key(|s| (s.starts_at(), s.id));
        Ok(schedules)
    }

    async fn mark_schedule_resolved(&self, id: i64, at: NaiveDateTime, cancelled: bool) -> StoreResult<bool> {
        let mut state = self.state();
        match state.schedules.get_mut(&id) {
            Some(s) if s.auto_cancel_checked_at.is_none() => {
                s.auto_cancel_checked_at = Some(at);
                s.auto_cancelled = cancelled;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn flag_schedule_cancelled(&self, id: i64) -> StoreResult<()> {
        if let Some(s) = self.state().schedules.get_mut(&id) {
            if s.auto_cancel_checked_at.is_none() {
                s.auto_cancelled = true;
            }
        }
        Ok(())
    }

    async fn member_commitments(&self, member_id: i64, date: NaiveDate) -> StoreResult<Vec<Commitment>> {
        let state = self.state();
        Ok(state
            .bookings
            .values()
            .filter(|b| b.member_id == member_id && b.status.is_active())
            .filter_map(|b| state.schedules.get(&b.schedule_id).map(|s| (b, s)))
            .filter(|(_, s)| s.date_start == date)
            .map(|(b, s)| Self::commitment(b.id, s))
            .collect())
    }

    async fn trainer_commitments(&self, trainer_id: i64, date: NaiveDate) -> StoreResult<Vec<Commitment>> {
        Ok(self
            .state()
            .schedules
            .values()
            .filter(|s| s.trainer_id == trainer_id && s.date_start == date)
            .map(|s| Self::commitment(s.id, s))
            .collect())
    }

    async fn member_packages(&self, member_id: i64) -> StoreResult<Vec<MemberPackage>> {
        Ok(self
            .state()
            .member_packages
            .values()
            .filter(|mp| mp.member_id == member_id)
            .cloned()
            .collect())
    }

    async fn member_package(&self, id: i64) -> StoreResult<Option<MemberPackage>> {
        Ok(self.state().member_packages.get(&id).cloned())
    }

    async fn funded_signup_categories(&self, member_package_id: i64) -> StoreResult<Vec<SessionType>> {
        let state = self.state();
        Ok(state
            .bookings
            .values()
            .filter(|b| b.member_package_id == Some(member_package_id) && b.status == BookingStatus::Signup)
            .filter_map(|b| {
                b.credit_category
                    .or_else(|| state.schedules.get(&b.schedule_id).map(|s| s.session_type))
            })
            .collect())
    }

    async fn write_counters(&self, member_package_id: i64, counters: &CreditCounters) -> StoreResult<()> {
        let mut state = self.state();
        if state.failing_counter_writes > 0 {
            state.failing_counter_writes -= 1;
            return Err(StoreError::Unavailable("injected counter write failure".to_string()));
        }
        if let Some(mp) = state.member_packages.get_mut(&member_package_id) {
            mp.apply_counters(counters);
        }
        Ok(())
    }

    async fn stamp_package_period(&self, member_package_id: i64, start: NaiveDate, end: NaiveDate) -> StoreResult<bool> {
        let mut state = self.state();
        match state.member_packages.get_mut(&member_package_id) {
            Some(mp) if mp.start_date.is_none() => {
                mp.start_date = Some(start);
                mp.end_date = Some(end);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn booking(&self, id: i64) -> StoreResult<Option<Booking>> {
        Ok(self.state().bookings.get(&id).cloned())
    }

    async fn latest_booking(&self, member_id: i64, schedule_id: i64) -> StoreResult<Option<Booking>> {
        Ok(self
            .state()
            .bookings
            .values()
            .filter(|b| b.member_id == member_id && b.schedule_id == schedule_id)
            .max_by_key(|b| (b.status.is_active(), b.updated_at, b.id))
            .cloned())
    }

    async fn schedule_bookings(&self, schedule_id: i64) -> StoreResult<Vec<Booking>> {
        Ok(self
            .state()
            .bookings
            .values()
            .filter(|b| b.schedule_id == schedule_id)
            .cloned()
            .collect())
    }

    async fn count_signups(&self, schedule_id: i64) -> StoreResult<i64> {
        Ok(self
            .state()
            .bookings
            .values()
            .filter(|b| b.schedule_id == schedule_id && b.status == BookingStatus::Signup)
            .count() as i64)
    }

    async fn next_waitlisted(&self, schedule_id: i64) -> StoreResult<Option<Booking>> {
        Ok(self
            .state()
            .bookings
            .values()
            .filter(|b| b.schedule_id == schedule_id && b.status == BookingStatus::WaitingList)
            .min_by_key(|b| b.queue_key())
            .cloned())
    }

    async fn insert_booking(&self, booking: NewBooking) -> StoreResult<Booking> {
        Ok(Self::insert_locked(&mut self.state(), booking))
    }

    async fn save_booking(&self, booking: &Booking) -> StoreResult<()> {
        let mut state = self.state();
        if !state.bookings.contains_key(&booking.id) {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        }
        state.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn apply_booking_batch(&self, inserts: Vec<NewBooking>, updates: Vec<Booking>) -> StoreResult<Vec<Booking>> {
        let mut state = self.state();
        if let Some(missing) = updates.iter().find(|b| !state.bookings.contains_key(&b.id)) {
            return Err(StoreError::Unavailable(format!("booking {} vanished during batch", missing.id)));
        }
        let mut written = Vec::with_capacity(inserts.len() + updates.len());
        for booking in updates {
            state.bookings.insert(booking.id, booking.clone());
            written.push(booking);
        }
        for new in inserts {
            written.push(Self::insert_locked(&mut state, new));
        }
        Ok(written)
    }
}
