//! JSON observer for serializing counter snapshots.
//!
//! [`JsonObserver`] serializes a collection of [`StatsSnapshot`]s with
//! serde. By default the output is a bare array; wrapped output adds an
//! optional capture timestamp.
//!
//! # Feature Flag
//!
//! This module requires the `json` feature.
//!
//! # Examples
//!
//! ```rust
//! use sommatori::counter::ShardedCounter;
//! use sommatori::keys::Namespace;
//! use sommatori::observers::json::JsonObserver;
//! use sommatori::store::memory::MemoryStore;
//!
//! let counter = ShardedCounter::new(MemoryStore::new(), Namespace::new("orders"));
//! counter.increment(42)?;
//!
//! let json = JsonObserver::new().to_json([&counter.snapshot()?])?;
//! assert!(json.contains(r#""total":42"#));
//! # Ok::<(), sommatori::observers::ObserverError>(())
//! ```

use serde::{Deserialize, Serialize};

use super::Result;
use crate::snapshot::StatsSnapshot;

/// Wrapped output: the snapshots plus an optional capture time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsReport {
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    /// The captured counters.
    pub counters: Vec<StatsSnapshot>,
}

impl StatsReport {
    /// Finds a counter by namespace name.
    pub fn get(&self, namespace: &str) -> Option<&StatsSnapshot> {
        self.counters.iter().find(|c| c.namespace == namespace)
    }
}

/// Configuration for the JSON observer.
#[derive(Debug, Clone, Default)]
pub struct JsonConfig {
    /// Whether to pretty-print the JSON output.
    pub pretty: bool,
    /// Whether to include a timestamp in the output.
    pub include_timestamp: bool,
    /// Whether to wrap the snapshots in a [`StatsReport`] object.
    pub wrap_in_report: bool,
}

/// An observer that serializes counter snapshots to JSON.
///
/// ```rust,ignore
/// let observer = JsonObserver::new()
///     .pretty(true)
///     .wrap_in_report(true)
///     .include_timestamp(true);
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonObserver {
    config: JsonConfig,
}

impl JsonObserver {
    /// Creates a new JSON observer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new JSON observer with the specified configuration.
    pub fn with_config(config: JsonConfig) -> Self {
        Self { config }
    }

    /// Enables or disables pretty-printing.
    pub fn pretty(mut self, enabled: bool) -> Self {
        self.config.pretty = enabled;
        self
    }

    /// Enables or disables timestamp inclusion.
    ///
    /// Only has effect when `wrap_in_report` is also enabled.
    pub fn include_timestamp(mut self, enabled: bool) -> Self {
        self.config.include_timestamp = enabled;
        self
    }

    /// Enables or disables wrapping the output in a [`StatsReport`].
    pub fn wrap_in_report(mut self, enabled: bool) -> Self {
        self.config.wrap_in_report = enabled;
        self
    }

    /// Builds the wrapped representation.
    pub fn report<'a>(
        &self,
        snapshots: impl IntoIterator<Item = &'a StatsSnapshot>,
    ) -> StatsReport {
        StatsReport {
            timestamp_ms: self
                .config
                .include_timestamp
                .then(current_timestamp_ms),
            counters: snapshots.into_iter().cloned().collect(),
        }
    }

    /// Serializes snapshots to a JSON string.
    pub fn to_json<'a>(
        &self,
        snapshots: impl IntoIterator<Item = &'a StatsSnapshot>,
    ) -> Result<String> {
        Ok(String::from_utf8(self.to_json_bytes(snapshots)?)?)
    }

    /// Serializes snapshots to a JSON byte vector.
    pub fn to_json_bytes<'a>(
        &self,
        snapshots: impl IntoIterator<Item = &'a StatsSnapshot>,
    ) -> Result<Vec<u8>> {
        let bytes = if self.config.wrap_in_report {
            self.encode(&self.report(snapshots))?
        } else {
            let snapshots: Vec<&StatsSnapshot> = snapshots.into_iter().collect();
            self.encode(&snapshots)?
        };
        Ok(bytes)
    }

    fn encode<T: Serialize>(&self, value: &T) -> serde_json::Result<Vec<u8>> {
        if self.config.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        }
    }
}

/// Returns the current timestamp in milliseconds since Unix epoch.
fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::StatEntry;

    fn snapshot(namespace: &str, total: i64) -> StatsSnapshot {
        StatsSnapshot {
            namespace: namespace.into(),
            total: Some(total),
            shards: Some(1),
            stats: vec![StatEntry::new("increments", 3)],
        }
    }

    #[test]
    fn test_to_json_empty() {
        let none: [&StatsSnapshot; 0] = [];
        let json = JsonObserver::new().to_json(none).unwrap();
        assert_eq!(json, "[]");
    }

    #[test]
    fn test_to_json_multiple() {
        let orders = snapshot("orders", 1000);
        let refunds = snapshot("refunds", -5);

        let json = JsonObserver::new().to_json([&orders, &refunds]).unwrap();

        assert!(json.starts_with('['));
        assert!(json.contains(r#""namespace":"orders""#));
        assert!(json.contains(r#""total":1000"#));
        assert!(json.contains(r#""total":-5"#));
    }

    #[test]
    fn test_pretty() {
        let orders = snapshot("orders", 1);
        let json = JsonObserver::new().pretty(true).to_json([&orders]).unwrap();
        assert!(json.contains('\n'));
        assert!(json.contains("  "));
    }

    #[test]
    fn test_wrap_without_timestamp() {
        let orders = snapshot("orders", 1);
        let json = JsonObserver::new()
            .wrap_in_report(true)
            .to_json([&orders])
            .unwrap();
        assert!(json.starts_with(r#"{"counters":"#));
        assert!(!json.contains("timestamp_ms"));
    }

    #[test]
    fn test_wrap_with_timestamp() {
        let orders = snapshot("orders", 7);
        let observer = JsonObserver::new()
            .wrap_in_report(true)
            .include_timestamp(true);
        let json = observer.to_json([&orders]).unwrap();

        let report: StatsReport = serde_json::from_str(&json).unwrap();
        assert!(report.timestamp_ms.unwrap() > 0);
        assert_eq!(report.get("orders"), Some(&orders));
        assert!(report.get("refunds").is_none());
    }

    #[test]
    fn test_timestamp_ignored_without_wrap() {
        let orders = snapshot("orders", 7);
        let json = JsonObserver::new()
            .include_timestamp(true)
            .to_json([&orders])
            .unwrap();
        assert!(!json.contains("timestamp_ms"));
    }

    #[test]
    fn test_with_config() {
        let config = JsonConfig {
            pretty: false,
            include_timestamp: false,
            wrap_in_report: true,
        };
        let orders = snapshot("orders", 7);
        let bytes = JsonObserver::with_config(config)
            .to_json_bytes([&orders])
            .unwrap();
        let report: StatsReport = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(report.counters.len(), 1);
    }
}
