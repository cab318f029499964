use chrono::Duration;
use kestrel_data::Venue;
use std::collections::HashMap;

/// Exponential backoff with a cap, tracked per venue. Rate-limit and other
/// transient venue errors feed [`record_failure`](Self::record_failure);
/// a successful call resets the venue.
#[derive(Debug, Clone)]
pub struct VenueBackoff {
    base: Duration,
    cap: Duration,
    attempts: HashMap<Venue, u32>,
}

impl VenueBackoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempts: HashMap::new(),
        }
    }

    /// Record a transient failure and return the delay to wait before the
    /// next attempt against this venue.
    pub fn record_failure(&mut self, venue: Venue) -> Duration {
        let attempt = self.attempts.entry(venue).or_insert(0);
        *attempt = attempt.saturating_add(1);
        let attempt = *attempt;
        self.delay_for(attempt)
    }

    pub fn record_success(&mut self, venue: Venue) {
        self.attempts.remove(&venue);
    }

    /// Current delay without recording a new failure.
    pub fn current_delay(&self, venue: Venue) -> Duration {
        self.delay_for(self.attempts.get(&venue).copied().unwrap_or(0))
    }

    pub fn attempts(&self, venue: Venue) -> u32 {
        self.attempts.get(&venue).copied().unwrap_or(0)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::zero();
        }
        let factor = 1i64 << (attempt - 1).min(16);
        (self.base * factor as i32).min(self.cap)
    }
}

impl Default for VenueBackoff {
    fn default() -> Self {
        Self::new(Duration::milliseconds(250), Duration::seconds(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_cap() {
        let mut backoff = VenueBackoff::new(Duration::seconds(1), Duration::seconds(8));
        assert_eq!(backoff.record_failure(Venue::Mock), Duration::seconds(1));
        assert_eq!(backoff.record_failure(Venue::Mock), Duration::seconds(2));
        assert_eq!(backoff.record_failure(Venue::Mock), Duration::seconds(4));
        assert_eq!(backoff.record_failure(Venue::Mock), Duration::seconds(8));
        assert_eq!(backoff.record_failure(Venue::Mock), Duration::seconds(8));
    }

    #[test]
    fn success_resets() {
        let mut backoff = VenueBackoff::default();
        backoff.record_failure(Venue::Mock);
        backoff.record_failure(Venue::Mock);
        backoff.record_success(Venue::Mock);
        assert_eq!(backoff.current_delay(Venue::Mock), Duration::zero());
    }

    #[test]
    fn venues_are_independent(){
        let mut backoff = VenueBackoff::default();
        backoff.record_failure(Venue::Mock);
        assert_eq!(backoff.attempts(Venue::BinanceSpot), 0);
    }
}
