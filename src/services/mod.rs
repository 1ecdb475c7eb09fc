pub mod booking;
pub mod clock;
pub mod conflict;
pub mod ledger;
pub mod notification;
pub mod scheduler;
pub mod state_machine;

pub use booking::BookingEngine;
pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::SessionLedger;
pub use notification::NotificationDispatcher;
pub use scheduler::DeadlineScheduler;
