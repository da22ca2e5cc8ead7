//! Today Cache
//!
//! In-memory per-symbol list of the current UTC day's completed bars,
//! used to answer new-subscriber snapshots without a venue round-trip.
//!
//! A symbol's entry is created only by [`TodayCache::seed`] (from a full
//! snapshot); closed bars are appended only to seeded entries, so a cached
//! list is never missing the start of the day. Entries from an earlier day
//! are discarded when touched.

use std::collections::HashMap;

use chrono::NaiveDate;
use parking_lot::RwLock;

use crate::domain::streaming::{Bar, Symbol};

/// The bars of `day` in `bars`, in ascending timestamp order without
/// duplicate timestamps.
#[must_use]
pub fn bars_for_day(bars: &[Bar], day: NaiveDate) -> Vec<Bar> {
    let mut day_bars: Vec<Bar> = bars
        .iter()
        .filter(|bar| bar.timestamp.date_naive() == day)
        .cloned()
        .collect();
    day_bars.sort_by_key(|bar| bar.timestamp);
    day_bars.dedup_by_key(|bar| bar.timestamp);
    day_bars
}

#[derive(Debug)]
struct DayBars {
    day: NaiveDate,
    bars: Vec<Bar>,
}

/// Today's bars per symbol.
#[derive(Debug, Default)]
pub struct TodayCache {
    entries: RwLock<HashMap<Symbol, DayBars>>,
}

impl TodayCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entry for `symbol` with the bars of `today` found in `bars`.
    pub fn seed(&self, symbol: &str, bars: &[Bar], today: NaiveDate) {
        self.entries.write().insert(
            symbol.to_string(),
            DayBars {
                day: today,
                bars: bars_for_day(bars, today),
            },
        );
    }

    /// Append a closed bar to a seeded entry.
    ///
    /// A bar for a later day restarts the entry at that day; a bar with an
    /// existing timestamp replaces it. Returns `false` if the symbol is not
    /// seeded or the bar belongs to an earlier day.
    pub fn push(&self, bar: &Bar) -> bool {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(&bar.symbol) else {
            return false;
        };

        let bar_day = bar.timestamp.date_naive();
        if bar_day < entry.day {
            return false;
        }
        if bar_day > entry.day {
            entry.day = bar_day;
            entry.bars.clear();
        }

        match entry
            .bars
            .binary_search_by_key(&bar.timestamp, |existing| existing.timestamp)
        {
            Ok(pos) => entry.bars[pos] = bar.clone(),
            Err(pos) => entry.bars.insert(pos, bar.clone()),
        }
        true
    }

    /// Today's bars for `symbol`, or `None` when the cache cannot answer
    /// (never seeded, or seeded on an earlier day).
    #[must_use]
    pub fn bars(&self, symbol: &str, today: NaiveDate) -> Option<Vec<Bar>> {
        {
            let entries = self.entries.read();
            match entries.get(symbol) {
                None => return None,
                Some(entry) if entry.day == today => return Some(entry.bars.clone()),
                Some(_) => {}
            }
        }

        // Outdated entry
        self.entries.write().remove(symbol);
        None
    }

    /// Drop the entry for `symbol`.
    pub fn evict(&self, symbol: &str) {
        self.entries.write().remove(symbol);
    }

    /// Drop every entry; each symbol needs a fresh snapshot to seed again.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of seeded symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no symbol is seeded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
