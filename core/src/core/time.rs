//! Settlement clock
//!
//! Simulated wall-clock for the settlement day. Time advances in discrete
//! ticks; a fixed number of ticks forms a day, and offsets within the day
//! carve it into three windows:
//!
//! ```text
//! [trading_open, trading_close)      Trading     real-time cycle every tick
//! [trading_close, batch_start)       PostTrading no settlement action
//! [batch_start, ticks_per_day)       Batch       end-of-day pass, once per day
//! ```
//!
//! The clock also tracks whether the batch pass has already run today; the
//! flag resets whenever the clock is outside the batch window.

use serde::{Deserialize, Serialize};

/// Which window of the settlement day the clock is currently in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementPhase {
    /// Real-time matching and settlement run every tick
    Trading,

    /// No settlement action
    PostTrading,

    /// End-of-day batch settlement window
    Batch,
}

/// Simulated clock with trading and batch windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementClock {
    /// Total ticks elapsed since simulation start
    current_tick: usize,

    /// Number of ticks in one business day
    ticks_per_day: usize,

    /// Tick-within-day at which trading opens (inclusive)
    trading_open: usize,

    /// Tick-within-day at which trading closes (exclusive)
    trading_close: usize,

    /// Tick-within-day at which the batch window opens (inclusive)
    batch_start: usize,

    /// Whether today's batch pass has already run
    batch_run_today: bool,
}

impl SettlementClock {
    /// Create a clock at tick 0
    ///
    /// # Panics
    /// Panics unless `trading_open <= trading_close <= batch_start <
    /// ticks_per_day`.
    pub fn new(
        ticks_per_day: usize,
        trading_open: usize,
        trading_close: usize,
        batch_start: usize,
    ) -> Self {
        assert!(ticks_per_day > 0, "ticks_per_day must be positive");
        assert!(
            trading_open <= trading_close
                && trading_close <= batch_start
                && batch_start < ticks_per_day,
            "window offsets must satisfy open <= close <= batch < ticks_per_day"
        );

        Self {
            current_tick: 0,
            ticks_per_day,
            trading_open,
            trading_close,
            batch_start,
            batch_run_today: false,
        }
    }

    /// Advance time by one tick
    ///
    /// Leaving the batch window re-arms the once-per-day batch flag.
    pub fn advance(&mut self) {
        self.current_tick += 1;
        if self.phase() != SettlementPhase::Batch {
            self.batch_run_today = false;
        }
    }

    /// Total ticks since simulation start
    pub fn current_tick(&self) -> usize {
        self.current_tick
    }

    /// Current day (0-indexed)
    pub fn current_day(&self) -> usize {
        self.current_tick / self.ticks_per_day
    }

    /// Tick within the current day (0-indexed)
    pub fn tick_within_day(&self) -> usize {
        self.current_tick % self.ticks_per_day
    }

    /// Ticks per day
    pub fn ticks_per_day(&self) -> usize {
        self.ticks_per_day
    }

    /// Which window the clock is currently in
    pub fn phase(&self) -> SettlementPhase {
        let t = self.tick_within_day();
        if t >= self.batch_start {
            SettlementPhase::Batch
        } else if t >= self.trading_open && t < self.trading_close {
            SettlementPhase::Trading
        } else {
            SettlementPhase::PostTrading
        }
    }

    /// True if the batch pass is due: inside the batch window and not yet
    /// run today
    pub fn batch_pending(&self) -> bool {
        self.phase() == SettlementPhase::Batch && !self.batch_run_today
    }

    /// Record that today's batch pass has run
    pub fn mark_batch_run(&mut self) {
        self.batch_run_today = true;
    }
}
