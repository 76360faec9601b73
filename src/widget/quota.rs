use std::sync::Arc;

use fantabase_storage::keys::REMAINING_MESSAGES_KEY;
use fantabase_storage::store::{read_lenient, write_lenient};
use fantabase_storage::KeyValueStore;

pub const MAX_GUEST_MESSAGES: u32 = 5;

/// Clamp an arbitrary number into `[0, MAX_GUEST_MESSAGES]`.
/// Non-finite input maps to 0 and fractions floor.
pub fn clamp_remaining(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    value.floor().clamp(0.0, f64::from(MAX_GUEST_MESSAGES)) as u32
}

/// Parse a persisted remaining-count. Missing, blank, or non-numeric values
/// fall back to the full allowance.
fn parse_stored(stored: Option<&str>) -> u32 {
    let parsed = stored
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite());
    clamp_remaining(parsed.unwrap_or(f64::from(MAX_GUEST_MESSAGES)))
}

/// Remaining value before an optimistic decrement, used to roll it back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaCheckpoint {
    pub previous: u32,
}

/// Counter display derived from the quota: `used/max` plus one segment per
/// allowed message, the first `used` of them active.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuotaDisplay {
    pub used: u32,
    pub max: u32,
}

impl QuotaDisplay {
    pub fn counter_label(&self) -> String {
        format!("{}/{}", self.used, self.max)
    }

    pub fn segments(&self) -> Vec<bool> {
        (0..self.max).map(|i| i < self.used).collect()
    }
}

/// Bounded guest-message counter. Every write goes to the store before the
/// caller gets a chance to react to it.
pub struct QuotaTracker {
    store: Arc<dyn KeyValueStore>,
    remaining: u32,
}

impl QuotaTracker {
    pub fn initialize(store: Arc<dyn KeyValueStore>) -> Self {
        let stored = read_lenient(store.as_ref(), REMAINING_MESSAGES_KEY);
        let remaining = parse_stored(stored.as_deref());
        Self { store, remaining }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    pub fn display(&self) -> QuotaDisplay {
        QuotaDisplay {
            used: MAX_GUEST_MESSAGES - self.remaining,
            max: MAX_GUEST_MESSAGES,
        }
    }

    /// Clamp, store, and persist. Returns true when the quota is now exhausted.
    pub fn set_remaining(&mut self, value: f64) -> bool {
        self.remaining = clamp_remaining(value);
        write_lenient(
            self.store.as_ref(),
            REMAINING_MESSAGES_KEY,
            &self.remaining.to_string(),
        );
        self.is_exhausted()
    }

    /// Provisional decrement applied before the server confirms a send.
    pub fn apply_optimistic(&mut self) -> (QuotaCheckpoint, bool) {
        let checkpoint = QuotaCheckpoint {
            previous: self.remaining,
        };
        let limit_hit = self.set_remaining(f64::from(self.remaining) - 1.0);
        (checkpoint, limit_hit)
    }

    /// Server-reported value. Always overrides whatever was applied locally.
    pub fn reconcile_authoritative(&mut self, value: f64) -> bool {
        self.set_remaining(value)
    }

    pub fn rollback(&mut self, checkpoint: QuotaCheckpoint) -> bool {
        self.set_remaining(f64::from(checkpoint.previous))
    }

    /// Re-read the persisted value, picking up writes from other processes
    /// sharing the same store.
    pub fn reload(&mut self) -> u32 {
        let stored = read_lenient(self.store.as_ref(), REMAINING_MESSAGES_KEY);
        self.remaining = parse_stored(stored.as_deref());
        self.remaining
    }
}
