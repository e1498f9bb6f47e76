//! Countdown projection recomputed on every local tick.

/// Milliseconds left before `deadline_ms`, never negative.
pub fn remaining_ms(deadline_ms: u64, now_ms: u64) -> u64 {
    deadline_ms.saturating_sub(now_ms)
}

/// Whole seconds shown to the player, rounded up so `0` only appears once time is out.
pub fn remaining_seconds(deadline_ms: u64, now_ms: u64) -> u64 {
    remaining_ms(deadline_ms, now_ms).div_ceil(1_000)
}
