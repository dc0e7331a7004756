//! Single-flight state token
//!
//! Pure state machine driven by the coordinator task. It owns no I/O, so the
//! coalescing rules can be checked without a runtime.

/// Monotonic id of a dispatched fetch
pub type Generation = u64;

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    InFlight(Generation),
}

/// Decides when a signal starts a fetch and whether a finished fetch may apply
#[derive(Debug, Default)]
pub struct FlightControl {
    state: SyncState,
    last_generation: Generation,
    detached: bool,
}

impl FlightControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// A signal arrived. Returns the generation of the fetch to start, or
    /// `None` when one is already in flight (or the owner tore down).
    pub fn begin(&mut self) -> Option<Generation> {
        if self.detached {
            return None;
        }
        match self.state {
            SyncState::InFlight(_) => None,
            SyncState::Idle => {
                self.last_generation += 1;
                self.state = SyncState::InFlight(self.last_generation);
                Some(self.last_generation)
            }
        }
    }

    /// A fetch resolved. Returns true when its result belongs to the current
    /// flight and may be applied; the state is then back to `Idle` whether
    /// the fetch succeeded or not.
    pub fn complete(&mut self, generation: Generation) -> bool {
        match self.state {
            SyncState::InFlight(current) if current == generation && !self.detached => {
                self.state = SyncState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Invalidate every dispatched fetch and refuse new ones
    pub fn teardown(&mut self) {
        self.detached = true;
        self.last_generation += 1;
        self.state = SyncState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_starts_one_flight() {
        let mut flight = FlightControl::new();
        let first = flight.begin();
        assert_eq!(first, Some(1));
        assert_eq!(flight.begin(), None);
        assert_eq!(flight.begin(), None);
        assert_eq!(flight.state(), SyncState::InFlight(1));
    }

    #[test]
    fn test_complete_returns_to_idle() {
        let mut flight = FlightControl::new();
        let generation = flight.begin().unwrap();
        assert!(flight.complete(generation));
        assert_eq!(flight.state(), SyncState::Idle);

        // next burst gets a fresh generation
        assert_eq!(flight.begin(), Some(generation + 1));
    }

    #[test]
    fn test_stale_generation_is_rejected() {
        let mut flight = FlightControl::new();
        let first = flight.begin().unwrap();
        assert!(flight.complete(first));
        let second = flight.begin().unwrap();

        assert!(!flight.complete(first));
        assert_eq!(flight.state(), SyncState::InFlight(second));
    }

    #[test]
    fn test_teardown_discards_in_flight_fetch() {
        let mut flight = FlightControl::new();
        let generation = flight.begin().unwrap();

        flight.teardown();

        assert!(flight.is_detached());
        assert!(!flight.complete(generation));
        assert_eq!(flight.begin(), None);
        assert_eq!(flight.state(), SyncState::Idle);
    }
}
