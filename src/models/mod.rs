pub mod booking;
pub mod seat;
pub mod session;
pub mod showtime;
pub mod ticket;
pub mod user;

pub use booking::{Booking, BookingStatus, ContactField, ContactForm, ContactInfo, PriceBreakdown};
pub use seat::{Seat, SeatId, SeatStatus, Tier};
pub use session::{AuthUser, SessionContext, SessionToken};
pub use showtime::{Showtime, ShowtimeId, TierPriceTable};
pub use ticket::{ConfirmationPayload, Ticket};
pub use user::UserAccount;
