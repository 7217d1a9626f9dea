use crossbeam_utils::Backoff;

use super::config::IdleStrategy;

/// Per-loop idle helper. Callers re-invoke the protocol every tick; this only
/// decides how long a tick that made no progress waits before the next one.
pub struct Idler {
    strategy: IdleStrategy,
    backoff: Backoff,
}

impl Idler {
    pub fn new(strategy: IdleStrategy) -> Self {
        Self {
            strategy,
            backoff: Backoff::new(),
        }
    }

    /// Record the outcome of one tick.
    pub fn tick(&self, progressed: bool) {
        if progressed {
            self.backoff.reset();
            return;
        }
        match self.strategy {
            IdleStrategy::BusyPoll => std::hint::spin_loop(),
            IdleStrategy::Backoff => self.backoff.snooze(),
        }
    }
}
