use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;

/// Source of "now" for every timestamp and timer in the engine.
///
/// `Manual` time only moves when the engine advances it, so tests can step
/// through hours of simulated lifecycle without waiting.
#[derive(Debug)]
pub enum Clock {
    System,
    Manual(Mutex<DateTime<Utc>>),
}

impl Clock {
    pub fn manual(start: DateTime<Utc>) -> Self {
        Clock::Manual(Mutex::new(start))
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Manual(now) => *now.lock(),
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Clock::Manual(_))
    }

    /// Move a manual clock forward to `at`. Never moves backwards; a no-op on
    /// the system clock.
    pub fn advance_to(&self, at: DateTime<Utc>) {
        if let Clock::Manual(now) = self {
            let mut now = now.lock();
            if at > *now {
                *now = at;
            }
        }
    }

    /// `now + d`, saturating at the far end of the chrono range.
    pub fn after(&self, d: Duration) -> DateTime<Utc> {
        let now = self.now();
        chrono::Duration::from_std(d)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn manual_clock_only_moves_forward() {
        let clock = Clock::manual(t0());
        assert_eq!(clock.now(), t0());

        let later = t0() + chrono::Duration::seconds(30);
        clock.advance_to(later);
        assert_eq!(clock.now(), later);

        clock.advance_to(t0());
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn after_offsets_from_now() {
        let clock = Clock::manual(t0());
        assert_eq!(
            clock.after(Duration::from_millis(1500)),
            t0() + chrono::Duration::milliseconds(1500)
        );
        assert!(!Clock::System.is_manual());
    }
}
