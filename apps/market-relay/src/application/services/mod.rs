//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - [`SubscriptionRegistry`]: ref-counted client subscriptions driving
//!   upstream subscribe/unsubscribe
//! - [`StalenessMonitor`]: per-symbol silence detection
//! - [`TodayCache`]: today's bars per symbol for new-subscriber snapshots

mod registry;
mod staleness;
mod today_cache;

pub use registry::SubscriptionRegistry;
pub use staleness::{StalenessMonitor, StaleSymbol};
pub use today_cache::{TodayCache, bars_for_day};
