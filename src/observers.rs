//! Observers rendering counter snapshots.
//!
//! - [`table`] - pretty-print snapshots as tables using the `tabled` crate
//! - [`json`] - serialize snapshots to JSON
//!
//! All observers take [`StatsSnapshot`](crate::snapshot::StatsSnapshot)s and
//! report failures through the unified [`ObserverError`].
//!
//! # Feature Flags
//!
//! - `table` - enables the [`table`] module
//! - `json` - enables the [`json`] module
//! - `full` - enables both
//!
//! # Example
//!
//! ```rust,ignore
//! use sommatori::observers::Result;
//!
//! fn report(counter: &ShardedCounter<MemoryStore>) -> Result<()> {
//!     let snapshot = counter.snapshot()?;
//!
//!     #[cfg(feature = "table")]
//!     {
//!         use sommatori::observers::table::TableObserver;
//!         println!("{}", TableObserver::new().render([&snapshot]));
//!     }
//!
//!     #[cfg(feature = "json")]
//!     {
//!         use sommatori::observers::json::JsonObserver;
//!         println!("{}", JsonObserver::new().to_json([&snapshot])?);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod error;

pub use error::{ObserverError, Result};

#[cfg(feature = "table")]
pub mod table;

#[cfg(feature = "json")]
pub mod json;
