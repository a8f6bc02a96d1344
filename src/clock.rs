//! One-second countdown bound to the current phase.
//!
//! Every `start` bumps a generation counter. Ticks carry the generation they
//! were issued for, so a tick scheduled for a cancelled phase is ignored even
//! if it is delivered after the next phase has started.

/// Identifies one started phase
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClockSignal {
    /// One second consumed; the phase is still running
    Tick { remaining: u32 },
    /// The count reached zero. Delivered once per generation.
    Expired,
    /// Stale generation, or no running phase
    Ignored,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ClockState {
    Idle,
    Running { remaining: u32 },
    Expired,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PhaseClock {
    generation: u64,
    state: ClockState,
}

impl Default for PhaseClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseClock {
    pub fn new() -> Self {
        Self {
            generation: 0,
            state: ClockState::Idle,
        }
    }

    /// Start a countdown, cancelling whatever was running
    pub fn start(&mut self, seconds: u32) -> Generation {
        if self.cancel() {
            tracing::debug!(generation = self.generation, "running phase replaced");
        }
        self.generation += 1;
        self.state = ClockState::Running { remaining: seconds };
        Generation(self.generation)
    }

    pub fn tick(&mut self, generation: Generation) -> ClockSignal {
        if generation.0 != self.generation {
            tracing::trace!(stale = generation.0, current = self.generation, "stale tick");
            return ClockSignal::Ignored;
        }
        match self.state {
            ClockState::Running { remaining } if remaining <= 1 => {
                self.state = ClockState::Expired;
                ClockSignal::Expired
            }
            ClockState::Running { remaining } => {
                let remaining = remaining - 1;
                self.state = ClockState::Running { remaining };
                ClockSignal::Tick { remaining }
            }
            _ => ClockSignal::Ignored,
        }
    }

    /// Stop without expiring. Returns whether a running phase was stopped;
    /// cancelling an idle, expired or cancelled clock does nothing.
    pub fn cancel(&mut self) -> bool {
        if let ClockState::Running { .. } = self.state {
            self.state = ClockState::Cancelled;
            true
        } else {
            false
        }
    }

    pub fn generation(&self) -> Generation {
        Generation(self.generation)
    }

    pub fn remaining(&self) -> Option<u32> {
        match self.state {
            ClockState::Running { remaining } => Some(remaining),
            ClockState::Expired => Some(0),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ClockState::Running { .. })
    }

    pub fn has_expired(&self) -> bool {
        self.state == ClockState::Expired
    }
}
