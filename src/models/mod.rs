pub mod booking;
pub mod package;
pub mod schedule;

pub use booking::{Booking, BookingStatus, CancelledBy, Commitment, NewBooking};
pub use package::{CreditCounters, MemberPackage, Package, PackageType};
pub use schedule::{Schedule, SessionType};
