//! Reward calculation.
//!
//! Rewards are derived from the session length alone and are never stored
//! on their own; recompute them whenever they are needed.

/// Minutes at which the first bonus applies.
pub const FIRST_BONUS_MINUTES: u32 = 25;
/// Minutes at which the second bonus applies.
pub const SECOND_BONUS_MINUTES: u32 = 50;

const FIRST_BONUS: u32 = 5;
const SECOND_BONUS: u32 = 10;

/// Pure mapping from session minutes to earned coins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewardCalculator;

impl RewardCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Coins earned for a completed session of `minutes`.
    ///
    /// One coin per minute, plus 5 at 25 minutes and another 10 at 50.
    pub fn reward(&self, minutes: u32) -> u32 {
        reward(minutes)
    }
}

/// Free-function form of [`RewardCalculator::reward`].
pub fn reward(minutes: u32) -> u32 {
    let mut amount = minutes;
    if minutes >= FIRST_BONUS_MINUTES {
        amount = amount.saturating_add(FIRST_BONUS);
    }
    if minutes >= SECOND_BONUS_MINUTES {
        amount = amount.saturating_add(SECOND_BONUS);
    }
    amount
}
