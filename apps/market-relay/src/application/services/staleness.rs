//! Staleness Monitor
//!
//! Detects symbols that have gone silent while the transport still looks
//! healthy. Only upstream-subscribed symbols are tracked; a symbol with no
//! subscribers costs nothing and never produces an event.
//!
//! Each stale episode is reported once: the sweep that first sees a symbol
//! past the threshold flags it, and the next tick for that symbol clears
//! the flag and reports it as resumed.
//!
//! The monitor is advisory. It never touches the connection; reconnection
//! is driven by transport loss alone.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::domain::streaming::Symbol;

/// Floor for the sweep interval.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(50);

/// A symbol newly flagged as stale by a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleSymbol {
    /// Symbol name.
    pub symbol: Symbol,
    /// Wall-clock time of the last tick, `None` if none arrived since
    /// tracking began.
    pub last_tick_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
struct Activity {
    last_tick: Instant,
    last_tick_wall: Option<DateTime<Utc>>,
    stale: bool,
}

/// Per-symbol staleness detector.
#[derive(Debug)]
pub struct StalenessMonitor {
    threshold: Duration,
    symbols: Mutex<HashMap<Symbol, Activity>>,
}

impl StalenessMonitor {
    /// Create a monitor flagging symbols silent for longer than `threshold`.
    #[must_use]
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            symbols: Mutex::new(HashMap::new()),
        }
    }

    /// The configured staleness threshold.
    #[must_use]
    pub const fn threshold(&self) -> Duration {
        self.threshold
    }

    /// How often [`sweep`](Self::sweep) should run: a quarter of the
    /// threshold, never below 50ms.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        (self.threshold / 4).max(MIN_SWEEP_INTERVAL)
    }

    /// Start tracking `symbol`, counting silence from `now`.
    ///
    /// Returns `false` if the symbol was already tracked.
    pub fn track(&self, symbol: &str, now: Instant) -> bool {
        let mut symbols = self.symbols.lock();
        if symbols.contains_key(symbol) {
            return false;
        }
        symbols.insert(
            symbol.to_string(),
            Activity {
                last_tick: now,
                last_tick_wall: None,
                stale: false,
            },
        );
        true
    }

    /// Restart every symbol's silence clock at `now`.
    ///
    /// Stale flags are kept, so a symbol flagged before the rearm still
    /// reports resumed on its next tick.
    pub fn rearm(&self, now: Instant) {
        for activity in self.symbols.lock().values_mut() {
            activity.last_tick = now;
        }
    }

    /// Stop tracking `symbol`.
    pub fn untrack(&self, symbol: &str) -> bool {
        self.symbols.lock().remove(symbol).is_some()
    }

    /// Record a tick for `symbol`.
    ///
    /// Returns `true` when this tick ends a stale episode. Ticks for
    /// untracked symbols are ignored.
    pub fn record_tick(&self, symbol: &str, now: Instant, wall: DateTime<Utc>) -> bool {
        let mut symbols = self.symbols.lock();
        let Some(activity) = symbols.get_mut(symbol) else {
            return false;
        };

        activity.last_tick = now;
        activity.last_tick_wall = Some(wall);
        std::mem::replace(&mut activity.stale, false)
    }

    /// Flag every tracked symbol silent for longer than the threshold.
    ///
    /// Returns only symbols that were not already flagged, sorted by name.
    pub fn sweep(&self, now: Instant) -> Vec<StaleSymbol> {
        let mut symbols = self.symbols.lock();
        let mut newly_stale: Vec<StaleSymbol> = symbols
            .iter_mut()
            .filter(|(_, activity)| {
                !activity.stale
                    && now.saturating_duration_since(activity.last_tick) > self.threshold
            })
            .map(|(symbol, activity)| {
                activity.stale = true;
                StaleSymbol {
                    symbol: symbol.clone(),
                    last_tick_at: activity.last_tick_wall,
                }
            })
            .collect();

        newly_stale.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        newly_stale
    }

    /// Whether `symbol` is currently flagged stale.
    #[must_use]
    pub fn is_stale(&self, symbol: &str) -> bool {
        self.symbols.lock().get(symbol).is_some_and(|a| a.stale)
    }

    /// Number of tracked symbols.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.symbols.lock().len()
    }
}

// =============================================================================
// Tests
// =============================================================================
