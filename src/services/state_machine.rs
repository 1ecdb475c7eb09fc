//! Every legal booking status change, in one place.
//!
//! `transition` is pure: it takes the current status (or `None` for a row
//! that does not exist yet) and an event, and returns the next status plus
//! the side effects the engine has to carry out. Anything not listed here
//! is rejected.

use crate::error::BookingError;
use crate::models::{BookingStatus, CancelledBy};
use crate::services::notification::NotificationEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingEvent {
    /// Fresh request, no prior row for the pair.
    Request { has_capacity: bool },
    /// Request that rewrites a cancelled row in place. A non-empty waitlist
    /// sends the reactivated booking to the back of the queue.
    Reactivate { has_capacity: bool, waitlist_empty: bool },
    /// Waitlisted booking takes a freed slot.
    Promote,
    Cancel { actor: CancelledBy, past_cancel_buffer: bool },
    /// Waitlisted booking whose member has no credit left when its turn comes.
    Unfunded,
}

impl BookingEvent {
    fn name(&self) -> &'static str {
        match self {
            BookingEvent::Request { .. } => "request",
            BookingEvent::Reactivate { .. } => "reactivate",
            BookingEvent::Promote => "promote",
            BookingEvent::Cancel { .. } => "cancel",
            BookingEvent::Unfunded => "unfunded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    StampWaitlistJoined,
    ClearWaitlistJoined,
    RecordCancelledBy(CancelledBy),
    RecomputeLedger,
    StartPackageClock,
    PromoteWaitlist,
    Notify(NotificationEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("booking is already cancelled")]
    AlreadyCancelled,
    #[error("cancellation window has closed for this class")]
    CancelWindowClosed,
    #[error("illegal transition from {from:?} on {event}")]
    Illegal {
        from: Option<BookingStatus>,
        event: &'static str,
    },
}

impl TransitionError {
    pub fn for_booking(self, booking_id: i64) -> BookingError {
        match self {
            TransitionError::AlreadyCancelled => BookingError::AlreadyCancelled(booking_id),
            TransitionError::CancelWindowClosed => BookingError::Validation(self.to_string()),
            TransitionError::Illegal { from, event } => BookingError::IllegalTransition { from, event },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: BookingStatus,
    pub effects: Vec<Effect>,
}

fn admit(has_capacity: bool) -> Transition {
    if has_capacity {
        Transition {
            next: BookingStatus::Signup,
            effects: vec![
                Effect::ClearWaitlistJoined,
                Effect::RecomputeLedger,
                Effect::StartPackageClock,
                Effect::Notify(NotificationEvent::BookingConfirmed),
            ],
        }
    } else {
        Transition {
            next: BookingStatus::WaitingList,
            effects: vec![
                Effect::StampWaitlistJoined,
                Effect::RecomputeLedger,
                Effect::Notify(NotificationEvent::BookingConfirmed),
            ],
        }
    }
}

pub fn transition(current: Option<BookingStatus>, event: BookingEvent) -> Result<Transition, TransitionError> {
    use BookingStatus::*;

    match (current, event) {
        (None, BookingEvent::Request { has_capacity }) => Ok(admit(has_capacity)),

        (Some(Cancelled), BookingEvent::Reactivate { has_capacity, waitlist_empty }) => {
            Ok(admit(has_capacity && waitlist_empty))
        }

        (Some(WaitingList), BookingEvent::Promote) => Ok(Transition {
            next: Signup,
            effects: vec![
                Effect::ClearWaitlistJoined,
                Effect::RecomputeLedger,
                Effect::StartPackageClock,
                Effect::Notify(NotificationEvent::WaitlistPromoted),
            ],
        }),

        (Some(Signup | WaitingList), BookingEvent::Cancel { actor, past_cancel_buffer }) => {
            if actor == CancelledBy::User && past_cancel_buffer {
                return Err(TransitionError::CancelWindowClosed);
            }
            let notice = match actor {
                CancelledBy::System => NotificationEvent::ClassCancelled,
                CancelledBy::User | CancelledBy::Admin => NotificationEvent::BookingCancelled,
            };
            let mut effects = vec![
                Effect::RecordCancelledBy(actor),
                Effect::ClearWaitlistJoined,
                Effect::RecomputeLedger,
            ];
            // auto-cancel drains the whole schedule and promotes afterwards
            if actor != CancelledBy::System {
                effects.push(Effect::PromoteWaitlist);
            }
            effects.push(Effect::Notify(notice));
            Ok(Transition { next: Cancelled, effects })
        }

        (Some(WaitingList), BookingEvent::Unfunded) => Ok(Transition {
            next: Cancelled,
            effects: vec![
                Effect::RecordCancelledBy(CancelledBy::System),
                Effect::ClearWaitlistJoined,
                Effect::RecomputeLedger,
                Effect::Notify(NotificationEvent::BookingCancelled),
            ],
        }),

        (Some(Cancelled), BookingEvent::Cancel { .. }) => Err(TransitionError::AlreadyCancelled),

        (from, event) => Err(TransitionError::Illegal { from, event: event.name() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_request_is_admitted_or_queued_by_capacity() {
        let t = transition(None, BookingEvent::Request { has_capacity: true }).unwrap();
        assert_eq!(t.next, BookingStatus::Signup);
        assert!(t.effects.contains(&Effect::StartPackageClock));

        let t = transition(None, BookingEvent::Request { has_capacity: false }).unwrap();
        assert_eq!(t.next, BookingStatus::WaitingList);
        assert!(t.effects.contains(&Effect::StampWaitlistJoined));
        assert!(!t.effects.contains(&Effect::StartPackageClock));
    }

    #[test]
    fn reactivation_defers_to_existing_queue() {
        let t = transition(
            Some(BookingStatus::Cancelled),
            BookingEvent::Reactivate { has_capacity: true, waitlist_empty: false },
        )
        .unwrap();
        assert_eq!(t.next, BookingStatus::WaitingList);
    }

    #[test]
    fn no_direct_signup_waitlist_moves() {
        assert!(transition(Some(BookingStatus::Signup), BookingEvent::Promote).is_err());
        assert!(transition(Some(BookingStatus::Signup), BookingEvent::Request { has_capacity: true }).is_err());
        assert!(transition(Some(BookingStatus::WaitingList), BookingEvent::Reactivate {
            has_capacity: true,
            waitlist_empty: true
        })
        .is_err());
    }

    #[test]
    fn user_cancel_respects_buffer_but_admin_does_not() {
        let late_user = BookingEvent::Cancel { actor: CancelledBy::User, past_cancel_buffer: true };
        assert_eq!(
            transition(Some(BookingStatus::Signup), late_user),
            Err(TransitionError::CancelWindowClosed)
        );

        let late_admin = BookingEvent::Cancel { actor: CancelledBy::Admin, past_cancel_buffer: true };
        let t = transition(Some(BookingStatus::Signup), late_admin).unwrap();
        assert_eq!(t.next, BookingStatus::Cancelled);
        assert!(t.effects.contains(&Effect::PromoteWaitlist));
    }

    #[test]
    fn cancelling_a_waitlisted_booking_still_promotes() {
        let event = BookingEvent::Cancel { actor: CancelledBy::User, past_cancel_buffer: false };
        let t = transition(Some(BookingStatus::WaitingList), event).unwrap();
        assert!(t.effects.contains(&Effect::PromoteWaitlist));
        assert!(t.effects.contains(&Effect::ClearWaitlistJoined));
    }

    #[test]
    fn only_waitlisted_bookings_can_lose_funding() {
        let t = transition(Some(BookingStatus::WaitingList), BookingEvent::Unfunded).unwrap();
        assert_eq!(t.next, BookingStatus::Cancelled);
        assert!(t.effects.contains(&Effect::RecordCancelledBy(CancelledBy::System)));
        assert!(transition(Some(BookingStatus::Signup), BookingEvent::Unfunded).is_err());
    }

    #[test]
    fn second_cancel_is_rejected() {
        let event = BookingEvent::Cancel { actor: CancelledBy::Admin, past_cancel_buffer: false };
        let err = transition(Some(BookingStatus::Cancelled), event).unwrap_err();
        assert!(matches!(err.for_booking(9), BookingError::AlreadyCancelled(9)));
    }

    #[test]
    fn system_cancel_sends_class_cancelled() {
        let event = BookingEvent::Cancel { actor: CancelledBy::System, past_cancel_buffer: true };
        let t = transition(Some(BookingStatus::WaitingList), event).unwrap();
        assert!(t.effects.contains(&Effect::Notify(NotificationEvent::ClassCancelled)));
        assert!(!t.effects.contains(&Effect::PromoteWaitlist));
    }
}
