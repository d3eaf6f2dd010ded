use mockall::automock;
use time::OffsetDateTime;

/// A source of the current time.
///
/// Every decision and every recorded timestamp goes through this, so runs can
/// be tested without sleeping or touching file modification times.
#[automock]
pub trait Clock {
    /// The current time.
    fn now(&self) -> OffsetDateTime;
}

/// The real wall clock, in UTC.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
