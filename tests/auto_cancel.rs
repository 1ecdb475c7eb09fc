mod common;

use chrono::Duration;

use common::{day, hm, opening_time, Studio};
use studio_booking::config::SchedulerConfig;
use studio_booking::error::BookingError;
use studio_booking::models::{BookingStatus, CancelledBy, PackageType, SessionType};
use studio_booking::services::booking::AutoCancelOutcome;
use studio_booking::services::notification::NotificationEvent;
use studio_booking::services::DeadlineScheduler;
use studio_booking::store::BookingStore;

fn scheduler(studio: &Studio) -> DeadlineScheduler {
    DeadlineScheduler::new(studio.engine.clone(), studio.clock.clone(), SchedulerConfig::default())
}

#[tokio::test]
async fn under_subscribed_class_is_cancelled_at_deadline() {
    let studio = Studio::new();
    studio.class(1, SessionType::Group, 1, 3);
    let signup_pkg = studio.grant(1, PackageType::Membership, 5, 0, 0);
    studio.grant(2, PackageType::Membership, 5, 0, 0);

    let signup = studio.engine.request_booking(1, 1).await.unwrap().booking;
    let queued = studio.engine.request_booking(2, 1).await.unwrap().booking;
    assert_eq!(queued.status, BookingStatus::WaitingList);

    // 16:30 is the cancel deadline of the 18:00 class
    studio.clock.set(day().and_time(hm(16, 30)));
    let outcome = studio.engine.auto_cancel_evaluation(1).await.unwrap();
    assert_eq!(outcome, AutoCancelOutcome::Cancelled { cancelled: 2, promoted: 0 });

    for booking in studio.store.all_bookings() {
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.cancelled_by, Some(CancelledBy::System));
        assert_eq!(booking.waitlist_joined_at, None);
    }
    assert_eq!(studio.package(signup_pkg).remaining_group, 5);

    assert_eq!(studio.outbox.wait_for(NotificationEvent::ClassCancelled, 2).await, 2);
    assert!(studio.outbox.events_for(signup.id).contains(&NotificationEvent::ClassCancelled));
    assert!(!studio.outbox.events_for(queued.id).contains(&NotificationEvent::BookingCancelled));

    // second run is a no-op
    let again = studio.engine.auto_cancel_evaluation(1).await.unwrap();
    assert_eq!(again, AutoCancelOutcome::AlreadyResolved);
}

#[tokio::test]
async fn interrupted_auto_cancel_is_finished_by_the_next_run() {
    let studio = Studio::with_recompute_attempts(1);
    studio.class(1, SessionType::Group, 5, 3);
    let pkg = studio.grant(1, PackageType::Membership, 5, 0, 0);
    let booking = studio.engine.request_booking(1, 1).await.unwrap().booking;
    assert_eq!(studio.package(pkg).remaining_group, 4);

    studio.clock.set(day().and_time(hm(16, 30)));
    studio.store.fail_counter_writes(1);
    let err = studio.engine.auto_cancel_evaluation(1).await.unwrap_err();
    assert!(matches!(err, BookingError::LedgerSync { .. }));

    // closed to bookings, but not resolved yet
    let schedule = studio.store.schedule(1).await.unwrap().unwrap();
    assert!(schedule.auto_cancelled);
    assert_eq!(schedule.auto_cancel_checked_at, None);

    studio.advance(Duration::minutes(5));
    let outcome = studio.engine.auto_cancel_evaluation(1).await.unwrap();
    assert_eq!(outcome, AutoCancelOutcome::Cancelled { cancelled: 1, promoted: 0 });
    assert_eq!(studio.package(pkg).remaining_group, 5);
    assert_eq!(studio.outbox.wait_for(NotificationEvent::ClassCancelled, 1).await, 1);
    assert!(studio.outbox.events_for(booking.id).contains(&NotificationEvent::ClassCancelled));

    assert_eq!(studio.engine.auto_cancel_evaluation(1).await.unwrap(), AutoCancelOutcome::AlreadyResolved);
}

#[tokio::test]
async fn cancelled_class_refuses_new_bookings() {
    let studio = Studio::new();
    studio.class(1, SessionType::Group, 5, 3);
    studio.grant(1, PackageType::Membership, 5, 0, 0);
    studio.grant(2, PackageType::Membership, 5, 0, 0);
    studio.engine.request_booking(1, 1).await.unwrap();

    studio.clock.set(day().and_time(hm(16, 30)));
    studio.engine.auto_cancel_evaluation(1).await.unwrap();

    // reopen the booking window so only the auto-cancel flag blocks it
    studio.clock.set(opening_time());
    let err = studio.engine.request_booking(2, 1).await.unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));
}

#[tokio::test]
async fn viable_and_exempt_classes_are_left_alone() {
    let studio = Studio::new();
    studio.class(1, SessionType::Group, 5, 1);
    studio.class_at(2, SessionType::Private, 1, 1, hm(7, 0), hm(8, 0));
    studio.grant(1, PackageType::Membership, 5, 0, 0);
    studio.engine.request_booking(1, 1).await.unwrap();

    assert_eq!(studio.engine.auto_cancel_evaluation(1).await.unwrap(), AutoCancelOutcome::NotDue);

    studio.clock.set(day().and_time(hm(16, 45)));
    assert_eq!(
        studio.engine.auto_cancel_evaluation(1).await.unwrap(),
        AutoCancelOutcome::Viable { signups: 1 }
    );
    assert_eq!(studio.engine.auto_cancel_evaluation(1).await.unwrap(), AutoCancelOutcome::AlreadyResolved);
    assert_eq!(studio.engine.auto_cancel_evaluation(2).await.unwrap(), AutoCancelOutcome::NotApplicable);
    assert_eq!(studio.engine.auto_cancel_evaluation(42).await.unwrap(), AutoCancelOutcome::Missing);

    let booking = &studio.store.all_bookings()[0];
    assert_eq!(booking.status, BookingStatus::Signup);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_evaluations_cancel_once() {
    let studio = Studio::new();
    studio.class(1, SessionType::Group, 5, 3);
    studio.grant(1, PackageType::Membership, 5, 0, 0);
    studio.engine.request_booking(1, 1).await.unwrap();
    studio.clock.set(day().and_time(hm(17, 0)));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = studio.engine.clone();
            tokio::spawn(async move { engine.auto_cancel_evaluation(1).await })
        })
        .collect();

    let mut cancelled = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            AutoCancelOutcome::Cancelled { .. } => cancelled += 1,
            AutoCancelOutcome::AlreadyResolved => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(cancelled, 1);
    assert_eq!(studio.outbox.wait_for(NotificationEvent::ClassCancelled, 1).await, 1);
}

#[tokio::test]
async fn refresh_arms_only_eligible_classes() {
    let studio = Studio::new();
    studio.class(1, SessionType::Group, 5, 2);
    studio.class_at(2, SessionType::SemiPrivate, 3, 2, hm(7, 0), hm(8, 0));
    studio.class_at(3, SessionType::Private, 1, 1, hm(9, 0), hm(10, 0));
    let scheduler = scheduler(&studio);

    assert_eq!(scheduler.refresh().await.unwrap(), 2);
    let status = scheduler.status();
    assert_eq!(status.armed, 2);
    // 07:00 class with a 90 minute buffer
    assert_eq!(status.next_deadline, Some(day().and_time(hm(5, 30))));
    assert_eq!(status.last_refresh_at, Some(opening_time()));

    // deleted class disappears on the next rebuild
    studio.store.remove_schedule(2);
    assert_eq!(scheduler.refresh().await.unwrap(), 1);
    assert_eq!(scheduler.status().next_deadline, Some(day().and_time(hm(16, 30))));
}

#[tokio::test]
async fn due_deadlines_fire_exactly_once() {
    let studio = Studio::new();
    studio.class(1, SessionType::Group, 5, 2);
    studio.class_at(2, SessionType::Group, 5, 1, hm(7, 0), hm(8, 0));
    studio.grant(1, PackageType::Membership, 5, 0, 0);
    studio.engine.request_booking(1, 2).await.unwrap();
    let scheduler = scheduler(&studio);
    scheduler.refresh().await.unwrap();

    assert!(scheduler.fire_due().await.is_empty());

    studio.clock.set(day().and_time(hm(6, 0)));
    let fired = scheduler.fire_due().await;
    assert_eq!(fired, vec![(2, AutoCancelOutcome::Viable { signups: 1 })]);
    assert_eq!(scheduler.status().armed, 1);

    studio.clock.set(day().and_time(hm(16, 30)));
    let fired = scheduler.fire_due().await;
    assert_eq!(fired, vec![(1, AutoCancelOutcome::Cancelled { cancelled: 0, promoted: 0 })]);
    assert!(scheduler.fire_due().await.is_empty());
    assert_eq!(scheduler.status().armed, 0);
}

#[tokio::test]
async fn sweep_catches_classes_without_a_timer() {
    let studio = Studio::new();
    studio.class(1, SessionType::Group, 5, 2);
    studio.grant(1, PackageType::Membership, 5, 0, 0);
    studio.engine.request_booking(1, 1).await.unwrap();
    let scheduler = scheduler(&studio);

    // nothing armed, deadline passes anyway
    studio.clock.set(day().and_time(hm(16, 40)));
    let swept = scheduler.sweep().await.unwrap();
    assert_eq!(swept, vec![(1, AutoCancelOutcome::Cancelled { cancelled: 1, promoted: 0 })]);

    assert!(scheduler.sweep().await.unwrap().is_empty());
    studio.advance(Duration::minutes(15));
    assert!(scheduler.sweep().await.unwrap().is_empty());
}
