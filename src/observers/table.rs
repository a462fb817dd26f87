//! Table observer for pretty-printing counter snapshots.
//!
//! [`TableObserver`] renders [`StatsSnapshot`]s as a formatted table using the
//! `tabled` crate.
//!
//! # Feature Flag
//!
//! This module requires the `table` feature.
//!
//! # Examples
//!
//! ## Standard format (one row per value)
//!
//! ```rust,ignore
//! use sommatori::observers::table::{TableObserver, TableStyle};
//!
//! let observer = TableObserver::new().with_style(TableStyle::Rounded);
//! println!("{}", observer.render([&counter.snapshot()?]));
//! // ╭─────────┬───────────────────┬───────╮
//! // │ Counter │ Stat              │ Value │
//! // ├─────────┼───────────────────┼───────┤
//! // │ orders  │ total             │ 6     │
//! // │ orders  │ shards            │ 3     │
//! // │ orders  │ increments        │ 3     │
//! // │ orders  │ increment_retries │ 0     │
//! // ...
//! ```
//!
//! ## Compact format (multiple columns)
//!
//! ```rust,ignore
//! let observer = TableObserver::new().compact(true).columns(3);
//! println!("{}", observer.render([&snapshot]));
//! // ╭──────────────────┬───────────────────┬────────────────────────╮
//! // │ orders.total: 6  │ orders.shards: 3  │ orders.increments: 3   │
//! // ...
//! ```

use tabled::settings::object::Rows;
use tabled::settings::{Remove, Style};
use tabled::{builder::Builder, Table, Tabled};

use crate::snapshot::StatsSnapshot;

/// Available table styles for rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableStyle {
    /// ASCII table with simple characters: +, -, |
    Ascii,
    /// Modern rounded corners (default)
    #[default]
    Rounded,
    /// Sharp corners with box-drawing characters
    Sharp,
    /// Modern style with clean lines
    Modern,
    /// Extended ASCII characters
    Extended,
    /// GitHub-flavored Markdown table
    Markdown,
    /// ReStructuredText table
    ReStructuredText,
    /// Dots for borders
    Dots,
    /// No borders, just spacing
    Blank,
}

/// Separator style between name and value in compact mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompactSeparator {
    /// Colon separator: "name: value"
    #[default]
    Colon,
    /// Equals separator: "name = value"
    Equals,
    /// Arrow separator: "name → value"
    Arrow,
    /// Pipe separator: "name | value"
    Pipe,
    /// No separator, just space: "name value"
    Space,
}

impl CompactSeparator {
    /// Returns the separator string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompactSeparator::Colon => ": ",
            CompactSeparator::Equals => " = ",
            CompactSeparator::Arrow => " → ",
            CompactSeparator::Pipe => " | ",
            CompactSeparator::Space => " ",
        }
    }
}

/// Configuration for the table observer.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// The style to use for rendering.
    pub style: TableStyle,
    /// Whether to show the header row (only in non-compact mode).
    pub show_header: bool,
    /// Custom title for the table (optional).
    pub title: Option<String>,
    /// Whether to use compact format (name: value in cells).
    pub compact: bool,
    /// Number of columns in compact mode (default: 1).
    pub columns: usize,
    /// Separator between name and value in compact mode.
    pub separator: CompactSeparator,
    /// Placeholder for empty cells in compact mode.
    pub empty_cell: String,
    /// Whether to list tallies that are still zero.
    pub show_zero: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            style: TableStyle::default(),
            show_header: true,
            title: None,
            compact: false,
            columns: 1,
            separator: CompactSeparator::default(),
            empty_cell: String::new(),
            show_zero: true,
        }
    }
}

#[derive(Tabled)]
struct StatRow {
    #[tabled(rename = "Counter")]
    counter: String,
    #[tabled(rename = "Stat")]
    stat: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// An observer that renders counter snapshots as a formatted table.
///
/// Supports two rendering modes:
///
/// 1. **Standard mode**: a Counter / Stat / Value table
/// 2. **Compact mode**: a multi-column grid of "counter.stat: value" cells
#[derive(Debug, Clone, Default)]
pub struct TableObserver {
    config: TableConfig,
}

impl TableObserver {
    /// Creates a new table observer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new table observer with the specified configuration.
    pub fn with_config(config: TableConfig) -> Self {
        Self { config }
    }

    /// Sets the table style.
    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.config.style = style;
        self
    }

    /// Sets whether to show the header row.
    ///
    /// Only applies in standard (non-compact) mode.
    pub fn with_header(mut self, show: bool) -> Self {
        self.config.show_header = show;
        self
    }

    /// Sets an optional title for the table.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    /// Enables or disables compact mode.
    pub fn compact(mut self, enabled: bool) -> Self {
        self.config.compact = enabled;
        self
    }

    /// Sets the number of columns in compact mode.
    ///
    /// Values less than 1 are treated as 1.
    pub fn columns(mut self, count: usize) -> Self {
        self.config.columns = count.max(1);
        self
    }

    /// Sets the separator between name and value in compact mode.
    pub fn separator(mut self, sep: CompactSeparator) -> Self {
        self.config.separator = sep;
        self
    }

    /// Sets the placeholder text for empty cells in compact mode.
    pub fn empty_cell(mut self, placeholder: impl Into<String>) -> Self {
        self.config.empty_cell = placeholder.into();
        self
    }

    /// Sets whether zero tallies are listed.
    pub fn show_zero(mut self, show: bool) -> Self {
        self.config.show_zero = show;
        self
    }

    fn apply_style(&self, table: &mut Table) {
        match self.config.style {
            TableStyle::Ascii => {
                table.with(Style::ascii());
            }
            TableStyle::Rounded => {
                table.with(Style::rounded());
            }
            TableStyle::Sharp => {
                table.with(Style::sharp());
            }
            TableStyle::Modern => {
                table.with(Style::modern());
            }
            TableStyle::Extended => {
                table.with(Style::extended());
            }
            TableStyle::Markdown => {
                table.with(Style::markdown());
            }
            TableStyle::ReStructuredText => {
                table.with(Style::re_structured_text());
            }
            TableStyle::Dots => {
                table.with(Style::dots());
            }
            TableStyle::Blank => {
                table.with(Style::blank());
            }
        }
    }

    /// Flattens snapshots into (counter, stat, value) triples.
    fn entries<'a>(
        &self,
        snapshots: impl IntoIterator<Item = &'a StatsSnapshot>,
    ) -> Vec<(String, String, String)> {
        let mut entries = Vec::new();
        for snapshot in snapshots {
            let counter = if snapshot.namespace.is_empty() {
                "(unnamed)".to_string()
            } else {
                snapshot.namespace.clone()
            };
            if let Some(total) = snapshot.total {
                entries.push((counter.clone(), "total".to_string(), total.to_string()));
            }
            if let Some(shards) = snapshot.shards {
                entries.push((counter.clone(), "shards".to_string(), shards.to_string()));
            }
            for entry in &snapshot.stats {
                if entry.value == 0 && !self.config.show_zero {
                    continue;
                }
                entries.push((counter.clone(), entry.name.clone(), entry.value.to_string()));
            }
        }
        entries
    }

    fn titled(&self, table: Table) -> String {
        match &self.config.title {
            Some(title) => format!("{}\n{}", title, table),
            None => table.to_string(),
        }
    }

    fn render_compact<'a>(
        &self,
        snapshots: impl IntoIterator<Item = &'a StatsSnapshot>,
    ) -> String {
        let cells: Vec<String> = self
            .entries(snapshots)
            .into_iter()
            .map(|(counter, stat, value)| {
                format!("{counter}.{stat}{}{value}", self.config.separator.as_str())
            })
            .collect();

        if cells.is_empty() {
            return String::new();
        }

        let cols = self.config.columns;
        let mut builder = Builder::default();

        for chunk in cells.chunks(cols) {
            let mut row: Vec<String> = chunk.to_vec();
            // Pad the last row with empty cells
            while row.len() < cols {
                row.push(self.config.empty_cell.clone());
            }
            builder.push_record(row);
        }

        let mut table = builder.build();
        self.apply_style(&mut table);
        self.titled(table)
    }

    fn render_standard<'a>(
        &self,
        snapshots: impl IntoIterator<Item = &'a StatsSnapshot>,
    ) -> String {
        let rows: Vec<StatRow> = self
            .entries(snapshots)
            .into_iter()
            .map(|(counter, stat, value)| StatRow {
                counter,
                stat,
                value,
            })
            .collect();

        let mut table = Table::new(&rows);
        self.apply_style(&mut table);

        if !self.config.show_header {
            table.with(Remove::row(Rows::first()));
        }

        self.titled(table)
    }

    /// Renders the snapshots as a formatted table string.
    pub fn render<'a>(&self, snapshots: impl IntoIterator<Item = &'a StatsSnapshot>) -> String {
        if self.config.compact {
            self.render_compact(snapshots)
        } else {
            self.render_standard(snapshots)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::StatEntry;

    fn snapshot(namespace: &str) -> StatsSnapshot {
        StatsSnapshot {
            namespace: namespace.into(),
            total: Some(-12),
            shards: Some(3),
            stats: vec![
                StatEntry::new("increments", 100),
                StatEntry::new("increment_retries", 0),
            ],
        }
    }

    #[test]
    fn test_render_empty() {
        let none: [&StatsSnapshot; 0] = [];
        let output = TableObserver::new().render(none);
        assert!(output.contains("Counter"));
    }

    #[test]
    fn test_render_empty_compact() {
        let none: [&StatsSnapshot; 0] = [];
        let output = TableObserver::new().compact(true).columns(3).render(none);
        assert!(output.is_empty());
    }

    #[test]
    fn test_render_standard() {
        let orders = snapshot("orders");
        let output = TableObserver::new().render([&orders]);

        assert!(output.contains("orders"));
        assert!(output.contains("total"));
        assert!(output.contains("-12"));
        assert!(output.contains("increments"));
        assert!(output.contains("100"));
        assert!(output.contains("increment_retries"));
    }

    #[test]
    fn test_hide_zero() {
        let orders = snapshot("orders");
        let output = TableObserver::new().show_zero(false).render([&orders]);
        assert!(output.contains("increments"));
        assert!(!output.contains("increment_retries"));
    }

    #[test]
    fn test_render_compact() {
        let orders = snapshot("orders");
        let output = TableObserver::new()
            .compact(true)
            .columns(2)
            .render([&orders]);

        assert!(output.contains("orders.total: -12"));
        assert!(output.contains("orders.shards: 3"));
        assert!(output.contains("orders.increments: 100"));
        assert_eq!(output.lines().filter(|l| l.contains("orders.")).count(), 2);
    }

    #[test]
    fn test_compact_separator_and_padding() {
        let orders = StatsSnapshot {
            namespace: "orders".into(),
            total: Some(1),
            shards: None,
            stats: vec![],
        };
        let output = TableObserver::new()
            .compact(true)
            .columns(3)
            .separator(CompactSeparator::Equals)
            .empty_cell("-")
            .render([&orders]);
        assert!(output.contains("orders.total = 1"));
        assert!(output.contains(" - "));
    }

    #[test]
    fn test_without_header() {
        let orders = snapshot("orders");
        let output = TableObserver::new().with_header(false).render([&orders]);
        assert!(!output.contains("Counter"));
        assert!(output.contains("orders"));
    }

    #[test]
    fn test_title() {
        let orders = snapshot("orders");
        let output = TableObserver::new()
            .with_title("Contention run")
            .render([&orders]);
        assert!(output.starts_with("Contention run\n"));
    }

    #[test]
    fn test_styles() {
        let orders = snapshot("orders");
        for style in [
            TableStyle::Ascii,
            TableStyle::Rounded,
            TableStyle::Sharp,
            TableStyle::Modern,
            TableStyle::Extended,
            TableStyle::Markdown,
            TableStyle::ReStructuredText,
            TableStyle::Dots,
            TableStyle::Blank,
        ] {
            let output = TableObserver::new().with_style(style).render([&orders]);
            assert!(output.contains("orders"), "{style:?}");
        }
        let ascii = TableObserver::new()
            .with_style(TableStyle::Ascii)
            .render([&orders]);
        assert!(ascii.contains('+'));
    }

    #[test]
    fn test_unnamed() {
        let unnamed = snapshot("");
        let output = TableObserver::new().render([&unnamed]);
        assert!(output.contains("(unnamed)"));
    }
}
