use crate::constants::MS_PER_SECOND;

/// Per-turn countdown. Whole seconds only; sub-second time is carried between steps.
#[derive(Clone, Debug)]
pub struct Countdown {
    total_seconds: u32,
    remaining_seconds: u32,
    carry_ms: u64,
    paused: bool,
    expired: bool,
}

impl Countdown {
    pub fn new(total_seconds: u32) -> Self {
        Self {
            total_seconds,
            remaining_seconds: total_seconds,
            carry_ms: 0,
            paused: false,
            expired: false,
        }
    }

    pub fn total_seconds(&self) -> u32 {
        self.total_seconds
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Returns false when the clock was already paused.
    pub fn pause(&mut self) -> bool {
        if self.paused || self.expired {
            return false;
        }
        self.paused = true;
        true
    }

    pub fn resume(&mut self) -> bool {
        if !self.paused {
            return false;
        }
        self.paused = false;
        true
    }

    /// Advances the clock and returns true on the step that reaches zero, never again after.
    pub fn advance(&mut self, dt_ms: u64) -> bool {
        if self.paused || self.expired {
            return false;
        }
        self.carry_ms = self.carry_ms.saturating_add(dt_ms);
        while self.carry_ms >= MS_PER_SECOND && self.remaining_seconds > 0 {
            self.carry_ms -= MS_PER_SECOND;
            self.remaining_seconds -= 1;
        }
        if self.remaining_seconds == 0 {
            self.expired = true;
            self.carry_ms = 0;
            return true;
        }
        false
    }
}
