//! Per-instrument alert memory.
//!
//! Remembers the last trend state that was successfully delivered for
//! each instrument so that an unchanged trend is announced once, not
//! every cycle. In-memory only; a restart starts from a blank slate.

use std::collections::HashMap;

use crate::types::{Instrument, TrendState};

/// Last delivered state per instrument.
///
/// Owned and mutated only by the scheduler's sequential loop. If
/// instruments are ever scanned concurrently this needs a lock or one
/// memory per instrument task.
#[derive(Debug, Default, Clone)]
pub struct AlertMemory {
    last_sent: HashMap<Instrument, TrendState>,
}

impl AlertMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an alert for `state` would be news for `instrument`.
    /// Neutral is never alert-worthy.
    pub fn should_notify(&self, instrument: &Instrument, state: TrendState) -> bool {
        state.is_actionable() && self.last_sent.get(instrument) != Some(&state)
    }

    /// Record a delivered alert. Call only after the transport succeeded.
    pub fn record(&mut self, instrument: &Instrument, state: TrendState) {
        self.last_sent.insert(instrument.clone(), state);
    }

    pub fn last_sent(&self, instrument: &Instrument) -> Option<TrendState> {
        self.last_sent.get(instrument).copied()
    }

    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}
