//! booking.rs
//!
//! Booking engine: admission, waitlist, cancellation and auto-cancel for
//! schedule instances.
//!
//! Every operation that reads capacity and then writes a booking runs under
//! the per-schedule lock, so two requests for the last slot of a class are
//! serialised instead of both seeing a free seat. Credits belong to the
//! member, so everything from allocation to the ledger recompute also holds
//! the member's lock. Lock order is schedule first, then members in
//! ascending id; a member lock is never held while waiting on a schedule.
//!
//! Status changes go through `state_machine::transition`; this module only
//! carries out the effects it returns.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

use crate::error::{BookingError, BookingResult};
use crate::models::{Booking, BookingStatus, CancelledBy, NewBooking, Schedule};
use crate::services::clock::Clock;
use crate::services::conflict::{ConflictSubject, ConflictValidator};
use crate::services::ledger::{Allocation, LedgerSummary, LedgerWatcher, SessionLedger};
use crate::services::notification::{Notification, NotificationDispatcher, NotificationEvent};
use crate::services::state_machine::{transition, BookingEvent, Effect, Transition};
use crate::store::BookingStore;

const LOCK_TABLE_PRUNE_AT: usize = 1024;

/// One async mutex per id (schedule or member).
#[derive(Default)]
struct KeyedLocks {
    table: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    async fn acquire(&self, id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            if table.len() >= LOCK_TABLE_PRUNE_AT {
                table.retain(|_, m| Arc::strong_count(m) > 1);
            }
            Arc::clone(table.entry(id).or_default())
        };
        lock.lock_owned().await
    }

    /// Takes every lock in ascending id order.
    async fn acquire_all(&self, ids: &[i64]) -> Vec<OwnedMutexGuard<()>> {
        let ordered: BTreeSet<i64> = ids.iter().copied().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for id in ordered {
            guards.push(self.acquire(id).await);
        }
        guards
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingOutcome {
    pub booking: Booking,
    /// A cancelled row of the same member was rewritten instead of inserting.
    pub reused: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub booking: Booking,
    pub promoted: Option<Booking>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminAddOutcome {
    pub schedule_id: i64,
    pub bookings: Vec<Booking>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AutoCancelOutcome {
    /// Schedule no longer exists.
    Missing,
    /// Private sessions have no viability floor.
    NotApplicable,
    /// Cancel deadline has not been reached yet.
    NotDue,
    AlreadyResolved,
    Viable { signups: i64 },
    Cancelled { cancelled: usize, promoted: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct Roster {
    pub schedule: Schedule,
    pub signups: Vec<Booking>,
    /// In promotion order.
    pub waitlist: Vec<Booking>,
    pub cancelled: usize,
}

pub struct BookingEngine {
    store: Arc<dyn BookingStore>,
    ledger: SessionLedger,
    conflicts: ConflictValidator,
    notifier: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    schedule_locks: KeyedLocks,
    member_locks: KeyedLocks,
}

impl BookingEngine {
    pub fn new(
        store: Arc<dyn BookingStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<NotificationDispatcher>,
        recompute_attempts: u32,
    ) -> Self {
        Self {
            ledger: SessionLedger::new(Arc::clone(&store), Arc::clone(&clock), recompute_attempts),
            conflicts: ConflictValidator::new(Arc::clone(&store)),
            store,
            notifier,
            clock,
            schedule_locks: KeyedLocks::default(),
            member_locks: KeyedLocks::default(),
        }
    }

    pub fn with_ledger_watcher(mut self, watcher: Arc<dyn LedgerWatcher>) -> Self {
        self.ledger.add_watcher(watcher);
        self
    }

    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    pub fn conflicts(&self) -> &ConflictValidator {
        &self.conflicts
    }

    pub fn store(&self) -> &Arc<dyn BookingStore> {
        &self.store
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    async fn load_schedule(&self, schedule_id: i64) -> BookingResult<Schedule> {
        self.store
            .schedule(schedule_id)
            .await?
            .ok_or_else(|| BookingError::not_found("schedule", schedule_id))
    }

    fn ensure_bookable(schedule: &Schedule, now: NaiveDateTime) -> BookingResult<()> {
        if now >= schedule.starts_at() {
            return Err(BookingError::Validation("class has already started".to_string()));
        }
        if now >= schedule.booking_closes_at() {
            return Err(BookingError::Validation(format!(
                "booking closed {} hour(s) before class start",
                schedule.booking_deadline_hour
            )));
        }
        if schedule.auto_cancelled {
            return Err(BookingError::Validation("class was cancelled for low attendance".to_string()));
        }
        Ok(())
    }

    fn fund(booking: &mut Booking, allocation: &Allocation) {
        booking.package_id = Some(allocation.package_id);
        booking.member_package_id = Some(allocation.member_package_id);
        booking.credit_category = Some(allocation.category);
    }

    /// Field-level part of a transition: status, waitlist stamp, actor.
    fn apply_fields(booking: &mut Booking, t: &Transition, now: NaiveDateTime) {
        booking.status = t.next;
        booking.updated_at = now;
        if t.next != BookingStatus::Cancelled {
            booking.cancelled_by = None;
        }
        for effect in &t.effects {
            match effect {
                Effect::StampWaitlistJoined => booking.waitlist_joined_at = Some(now),
                Effect::ClearWaitlistJoined => booking.waitlist_joined_at = None,
                Effect::RecordCancelledBy(actor) => booking.cancelled_by = Some(*actor),
                _ => {}
            }
        }
    }

    /// Post-persist part of a transition. Returns whether a waitlist
    /// promotion was requested; the caller runs it under the same lock.
    ///
    /// The booking is already written, so a failed ledger step does not stop
    /// the remaining effects; the first failure is returned once all ran.
    async fn run_followups(
        &self,
        booking: &Booking,
        effects: &[Effect],
        previous_package: Option<i64>,
    ) -> BookingResult<bool> {
        let mut promote = false;
        let mut first_error = None;
        for effect in effects {
            let step = match effect {
                Effect::RecomputeLedger => self.recompute_funding(booking, previous_package).await,
                Effect::StartPackageClock => match booking.member_package_id {
                    Some(mp) => self.ledger.start_clock(mp).await.map(|_| ()),
                    None => Ok(()),
                },
                Effect::PromoteWaitlist => {
                    promote = true;
                    Ok(())
                }
                Effect::Notify(event) => {
                    self.notifier.dispatch(Notification::for_booking(*event, booking, self.clock.now()));
                    Ok(())
                }
                Effect::StampWaitlistJoined | Effect::ClearWaitlistJoined | Effect::RecordCancelledBy(_) => Ok(()),
            };
            if let Err(e) = step {
                warn!("Follow-up {:?} of booking {} failed: {}", effect, booking.id, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(promote),
        }
    }

    async fn recompute_funding(&self, booking: &Booking, previous_package: Option<i64>) -> BookingResult<()> {
        if let Some(previous) = previous_package.filter(|p| Some(*p) != booking.member_package_id) {
            self.ledger.recompute(previous).await?;
        }
        if let Some(mp) = booking.member_package_id {
            self.ledger.recompute(mp).await?;
        }
        Ok(())
    }

    /// Member asks for a place in a class.
    pub async fn request_booking(&self, member_id: i64, schedule_id: i64) -> BookingResult<BookingOutcome> {
        if member_id <= 0 || schedule_id <= 0 {
            return Err(BookingError::Validation("member_id and schedule_id must be > 0".to_string()));
        }

        let _schedule_guard = self.schedule_locks.acquire(schedule_id).await;
        let _member_guard = self.member_locks.acquire(member_id).await;
        let schedule = self.load_schedule(schedule_id).await?;
        let now = self.clock.now();
        Self::ensure_bookable(&schedule, now)?;

        self.conflicts
            .ensure_free(
                ConflictSubject::Member(member_id),
                schedule.date_start,
                schedule.time_start,
                schedule.time_end,
                None,
            )
            .await?;

        let allocation = self
            .ledger
            .allocate(member_id, 1, schedule.session_type)
            .await?
            .into_iter()
            .next()
            .ok_or(BookingError::InsufficientCredits {
                category: schedule.session_type,
                required: 1,
                available: 0,
            })?;

        let pax = i64::from(schedule.pax);
        let has_capacity = self.store.count_signups(schedule_id).await? < pax;

        let (booking, effects, previous_package, reused) = match self.store.latest_booking(member_id, schedule_id).await? {
            Some(mut prior) if prior.status == BookingStatus::Cancelled => {
                // re-check at the point of rewrite, and never jump the queue
                let has_capacity = self.store.count_signups(schedule_id).await? < pax;
                let waitlist_empty = self.store.next_waitlisted(schedule_id).await?.is_none();
                let t = transition(Some(prior.status), BookingEvent::Reactivate { has_capacity, waitlist_empty })
                    .map_err(|e| e.for_booking(prior.id))?;

                let previous_package = prior.member_package_id;
                Self::fund(&mut prior, &allocation);
                Self::apply_fields(&mut prior, &t, now);
                self.store.save_booking(&prior).await?;
                (prior, t.effects, previous_package, true)
            }
            // normally caught by the overlap check above
            Some(active) => {
                return Err(BookingError::IllegalTransition {
                    from: Some(active.status),
                    event: "request",
                });
            }
            None => {
                let t = transition(None, BookingEvent::Request { has_capacity }).map_err(|e| e.for_booking(0))?;
                let booking = self
                    .store
                    .insert_booking(NewBooking {
                        member_id,
                        schedule_id,
                        package_id: allocation.package_id,
                        member_package_id: allocation.member_package_id,
                        credit_category: allocation.category,
                        status: t.next,
                        waitlist_joined_at: t.effects.contains(&Effect::StampWaitlistJoined).then_some(now),
                        created_at: now,
                    })
                    .await?;
                (booking, t.effects, None, false)
            }
        };

        info!(
            "Booking {} for member {} on schedule {} -> {} (package {})",
            booking.id,
            member_id,
            schedule_id,
            booking.status.as_str(),
            allocation.member_package_id
        );

        self.run_followups(&booking, &effects, previous_package).await?;
        Ok(BookingOutcome { booking, reused })
    }

    /// Member cancels their own booking; subject to the cancel buffer.
    pub async fn cancel_booking(&self, booking_id: i64, member_id: i64) -> BookingResult<CancelOutcome> {
        self.cancel(booking_id, CancelledBy::User, Some(member_id)).await
    }

    /// Studio staff cancel any booking, at any time.
    pub async fn admin_cancel_booking(&self, booking_id: i64) -> BookingResult<CancelOutcome> {
        self.cancel(booking_id, CancelledBy::Admin, None).await
    }

    async fn cancel(&self, booking_id: i64, actor: CancelledBy, owner: Option<i64>) -> BookingResult<CancelOutcome> {
        if booking_id <= 0 {
            return Err(BookingError::Validation("booking_id must be > 0".to_string()));
        }
        let schedule_id = self
            .store
            .booking(booking_id)
            .await?
            .filter(|b| owner.map_or(true, |member| b.member_id == member))
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?
            .schedule_id;

        let _schedule_guard = self.schedule_locks.acquire(schedule_id).await;
        // перечитываем под блокировкой
        let mut booking = self
            .store
            .booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        let schedule = self.load_schedule(schedule_id).await?;
        let now = self.clock.now();

        let t = transition(
            Some(booking.status),
            BookingEvent::Cancel {
                actor,
                past_cancel_buffer: now > schedule.cancel_deadline(),
            },
        )
        .map_err(|e| e.for_booking(booking_id))?;

        // released before promotion, which locks the next member
        let wants_promotion = {
            let _member_guard = self.member_locks.acquire(booking.member_id).await;
            Self::apply_fields(&mut booking, &t, now);
            self.store.save_booking(&booking).await?;
            info!("Booking {} cancelled by {:?}", booking_id, actor);
            self.run_followups(&booking, &t.effects, None).await?
        };

        let promoted = if wants_promotion {
            self.promote_locked(&schedule).await?
        } else {
            None
        };
        Ok(CancelOutcome { booking, promoted })
    }

    /// Promotes at most one waitlisted booking if the class has room.
    pub async fn promote_waitlist(&self, schedule_id: i64) -> BookingResult<Option<Booking>> {
        let _guard = self.schedule_locks.acquire(schedule_id).await;
        let schedule = self.load_schedule(schedule_id).await?;
        self.promote_locked(&schedule).await
    }

    async fn promote_locked(&self, schedule: &Schedule) -> BookingResult<Option<Booking>> {
        let now = self.clock.now();
        loop {
            if self.store.count_signups(schedule.id).await? >= i64::from(schedule.pax) {
                return Ok(None);
            }
            let Some(mut candidate) = self.store.next_waitlisted(schedule.id).await? else {
                return Ok(None);
            };
            let _member_guard = self.member_locks.acquire(candidate.member_id).await;

            let previous_package = candidate.member_package_id;
            match self.refund(&candidate, schedule).await? {
                Some(allocation) => {
                    let t = transition(Some(candidate.status), BookingEvent::Promote)
                        .map_err(|e| e.for_booking(candidate.id))?;
                    Self::fund(&mut candidate, &allocation);
                    Self::apply_fields(&mut candidate, &t, now);
                    self.store.save_booking(&candidate).await?;
                    info!("Booking {} promoted from waitlist on schedule {}", candidate.id, schedule.id);

                    self.run_followups(&candidate, &t.effects, previous_package).await?;
                    return Ok(Some(candidate));
                }
                None => {
                    let t = transition(Some(candidate.status), BookingEvent::Unfunded)
                        .map_err(|e| e.for_booking(candidate.id))?;
                    Self::apply_fields(&mut candidate, &t, now);
                    self.store.save_booking(&candidate).await?;
                    warn!(
                        "Waitlisted booking {} dropped: member {} has no credit left",
                        candidate.id, candidate.member_id
                    );
                    self.run_followups(&candidate, &t.effects, None).await?;
                }
            }
        }
    }

    /// Keeps the original package when it can still pay, otherwise asks the
    /// ledger again. `None` means the member cannot pay at all.
    async fn refund(&self, candidate: &Booking, schedule: &Schedule) -> BookingResult<Option<Allocation>> {
        if let Some(mp) = candidate.member_package_id {
            if let Some(allocation) = self.ledger.allocate_from(mp, schedule.session_type).await? {
                return Ok(Some(allocation));
            }
        }
        match self.ledger.allocate(candidate.member_id, 1, schedule.session_type).await {
            Ok(allocations) => Ok(allocations.into_iter().next()),
            Err(BookingError::InsufficientCredits { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Staff add several members to a class at once. Either every member is
    /// admitted or nothing is written.
    pub async fn admin_add_members(&self, schedule_id: i64, member_ids: &[i64]) -> BookingResult<AdminAddOutcome> {
        if member_ids.is_empty() {
            return Err(BookingError::Validation("member_ids must not be empty".to_string()));
        }
        if member_ids.iter().any(|id| *id <= 0) {
            return Err(BookingError::Validation("member ids must be > 0".to_string()));
        }
        let unique: HashSet<i64> = member_ids.iter().copied().collect();
        if unique.len() != member_ids.len() {
            return Err(BookingError::Validation("member_ids contains duplicates".to_string()));
        }

        let _schedule_guard = self.schedule_locks.acquire(schedule_id).await;
        let _member_guards = self.member_locks.acquire_all(member_ids).await;
        let schedule = self.load_schedule(schedule_id).await?;
        let now = self.clock.now();
        if now >= schedule.starts_at() {
            return Err(BookingError::Validation("class has already started".to_string()));
        }
        if schedule.auto_cancelled {
            return Err(BookingError::Validation("class was cancelled for low attendance".to_string()));
        }

        self.conflicts
            .ensure_free(
                ConflictSubject::Trainer(schedule.trainer_id),
                schedule.date_start,
                schedule.time_start,
                schedule.time_end,
                Some(schedule.id),
            )
            .await?;

        let mut plans = Vec::with_capacity(member_ids.len());
        for member_id in member_ids {
            self.conflicts
                .ensure_free(
                    ConflictSubject::Member(*member_id),
                    schedule.date_start,
                    schedule.time_start,
                    schedule.time_end,
                    None,
                )
                .await?;
            let allocation = self
                .ledger
                .allocate(*member_id, 1, schedule.session_type)
                .await?
                .into_iter()
                .next()
                .ok_or(BookingError::InsufficientCredits {
                    category: schedule.session_type,
                    required: 1,
                    available: 0,
                })?;
            let prior = self
                .store
                .latest_booking(*member_id, schedule_id)
                .await?
                .filter(|b| b.status == BookingStatus::Cancelled);
            plans.push((*member_id, allocation, prior));
        }

        let requested = plans.len() as i32;
        let available = (i64::from(schedule.pax) - self.store.count_signups(schedule_id).await?).max(0) as i32;
        if requested > available {
            warn!(
                "Admin add to schedule {} rejected: {} requested, {} free",
                schedule_id, requested, available
            );
            return Err(BookingError::CapacityExceeded { requested, available });
        }

        let mut inserts = Vec::new();
        let mut updates = Vec::new();
        // member ids are unique within the batch
        let mut followups: HashMap<i64, (Vec<Effect>, Option<i64>)> = HashMap::new();
        for (member_id, allocation, prior) in plans {
            match prior {
                Some(mut booking) => {
                    let t = transition(
                        Some(booking.status),
                        BookingEvent::Reactivate { has_capacity: true, waitlist_empty: true },
                    )
                    .map_err(|e| e.for_booking(booking.id))?;
                    let previous = booking.member_package_id;
                    Self::fund(&mut booking, &allocation);
                    Self::apply_fields(&mut booking, &t, now);
                    updates.push(booking);
                    followups.insert(member_id, (t.effects, previous));
                }
                None => {
                    let t = transition(None, BookingEvent::Request { has_capacity: true })
                        .map_err(|e| e.for_booking(0))?;
                    inserts.push(NewBooking {
                        member_id,
                        schedule_id,
                        package_id: allocation.package_id,
                        member_package_id: allocation.member_package_id,
                        credit_category: allocation.category,
                        status: t.next,
                        waitlist_joined_at: t.effects.contains(&Effect::StampWaitlistJoined).then_some(now),
                        created_at: now,
                    });
                    followups.insert(member_id, (t.effects, None));
                }
            }
        }

        let bookings = self.store.apply_booking_batch(inserts, updates).await?;
        info!("Admin added {} member(s) to schedule {}", bookings.len(), schedule_id);

        let mut first_error = None;
        for booking in &bookings {
            let Some((effects, previous)) = followups.get(&booking.member_id) else {
                continue;
            };
            if let Err(e) = self.run_followups(booking, effects, *previous).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(AdminAddOutcome { schedule_id, bookings }),
        }
    }

    /// Cancels the whole class if it did not reach `min_signup` by its cancel
    /// deadline. Safe to call repeatedly and concurrently.
    ///
    /// The class is flagged cancelled before any booking is touched, which
    /// closes it to new requests. The resolution marker is only set once every
    /// booking is cancelled and every affected ledger recomputed, so a run that
    /// fails halfway is finished by the next timer or sweep.
    pub async fn auto_cancel_evaluation(&self, schedule_id: i64) -> BookingResult<AutoCancelOutcome> {
        let _guard = self.schedule_locks.acquire(schedule_id).await;
        let Some(schedule) = self.store.schedule(schedule_id).await? else {
            return Ok(AutoCancelOutcome::Missing);
        };
        if !schedule.session_type.has_minimum_signup() {
            return Ok(AutoCancelOutcome::NotApplicable);
        }
        let now = self.clock.now();
        let deadline = schedule.cancel_deadline();
        if now < deadline {
            return Ok(AutoCancelOutcome::NotDue);
        }
        if schedule.auto_cancel_checked_at.is_some() {
            return Ok(AutoCancelOutcome::AlreadyResolved);
        }

        if schedule.auto_cancelled {
            info!("Resuming unfinished auto-cancel of schedule {}", schedule_id);
        } else {
            let signups = self.store.count_signups(schedule_id).await?;
            if signups >= i64::from(schedule.min_signup) {
                if !self.store.mark_schedule_resolved(schedule_id, now, false).await? {
                    return Ok(AutoCancelOutcome::AlreadyResolved);
                }
                info!("Schedule {} is viable with {} signup(s)", schedule_id, signups);
                return Ok(AutoCancelOutcome::Viable { signups });
            }
            self.store.flag_schedule_cancelled(schedule_id).await?;
            warn!(
                "Schedule {} below minimum: {} signup(s) of {} required, cancelling",
                schedule_id, signups, schedule.min_signup
            );
        }

        // bookings a previous, failed run already cancelled are carried along
        let mut resolved = Vec::new();
        for mut booking in self.store.schedule_bookings(schedule_id).await? {
            if booking.status.is_active() {
                let t = transition(
                    Some(booking.status),
                    BookingEvent::Cancel { actor: CancelledBy::System, past_cancel_buffer: true },
                )
                .map_err(|e| e.for_booking(booking.id))?;
                let _member_guard = self.member_locks.acquire(booking.member_id).await;
                Self::apply_fields(&mut booking, &t, now);
                self.store.save_booking(&booking).await?;
                resolved.push(booking);
            } else if booking.cancelled_by == Some(CancelledBy::System) && booking.updated_at >= deadline {
                resolved.push(booking);
            }
        }

        let mut packages: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
        for booking in &resolved {
            if let Some(mp) = booking.member_package_id {
                packages.entry(booking.member_id).or_default().insert(mp);
            }
        }
        for (member_id, member_packages) in packages {
            let _member_guard = self.member_locks.acquire(member_id).await;
            for mp in member_packages {
                self.ledger.recompute(mp).await?;
            }
        }

        let mut promoted = 0;
        while self.promote_locked(&schedule).await?.is_some() {
            promoted += 1;
        }

        if !self.store.mark_schedule_resolved(schedule_id, now, true).await? {
            return Ok(AutoCancelOutcome::AlreadyResolved);
        }
        for booking in &resolved {
            self.notifier
                .dispatch(Notification::for_booking(NotificationEvent::ClassCancelled, booking, now));
        }

        warn!(
            "Schedule {} auto-cancelled: {} booking(s) cancelled",
            schedule_id,
            resolved.len()
        );
        Ok(AutoCancelOutcome::Cancelled {
            cancelled: resolved.len(),
            promoted,
        })
    }

    /// Ledger reconcile under the member's lock, so it cannot interleave
    /// with a booking of the same member.
    pub async fn reconcile_member(&self, member_id: i64) -> BookingResult<LedgerSummary> {
        let _member_guard = self.member_locks.acquire(member_id).await;
        self.ledger.reconcile_member(member_id).await
    }

    pub async fn roster(&self, schedule_id: i64) -> BookingResult<Roster> {
        let schedule = self.load_schedule(schedule_id).await?;
        let bookings = self.store.schedule_bookings(schedule_id).await?;

        let mut signups = Vec::new();
        let mut waitlist = Vec::new();
        let mut cancelled = 0;
        for booking in bookings {
            match booking.status {
                BookingStatus::Signup => signups.push(booking),
                BookingStatus::WaitingList => waitlist.push(booking),
                BookingStatus::Cancelled => cancelled += 1,
            }
        }
        signups.sort_by_key(|b| (b.created_at, b.id));
        waitlist.sort_by_key(|b| b.queue_key());

        Ok(Roster {
            schedule,
            signups,
            waitlist,
            cancelled,
        })
    }
}
