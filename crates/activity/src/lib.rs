//! Combined activity feed over bot posts, trades and audit logs, plus the
//! SQLite store those records live in.

pub mod aggregator;
pub mod records;
pub mod source;
pub mod store;

pub use aggregator::{combined_activity, FeedLimit};
pub use records::{ActivityDetails, CombinedActivityItem};
pub use source::{ActivitySource, SqliteActivitySource};
pub use store::BotStore;
