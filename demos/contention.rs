//! Demo application hammering one sharded counter from many threads.
//!
//! Run with:
//! ```bash
//! cargo run --example contention --features demo -- --help
//! RUST_LOG=sommatori=debug cargo run --example contention --features demo -- --writers 16
//! ```

use clap::{Parser, ValueEnum};
use sommatori::config::CounterConfig;
use sommatori::counter::ShardedCounter;
use sommatori::keys::Namespace;
use sommatori::observers::json::JsonObserver;
use sommatori::observers::table::{CompactSeparator, TableObserver, TableStyle};
use sommatori::shard_id::{ShardIdWidth, DEFAULT_COLLISION_TARGET};
use sommatori::snapshot::StatsSnapshot;
use sommatori::store::memory::MemoryStore;
use std::sync::Arc;
use std::panic;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Output format for the final report.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Pretty table (one row per value)
    Table,
    /// Compact table with multiple columns
    Compact,
    /// JSON format
    Json,
}

/// Table style selection.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum StyleChoice {
    Ascii,
    #[default]
    Rounded,
    Sharp,
    Modern,
    Markdown,
    Dots,
    Blank,
}

impl From<StyleChoice> for TableStyle {
    fn from(choice: StyleChoice) -> Self {
        match choice {
            StyleChoice::Ascii => TableStyle::Ascii,
            StyleChoice::Rounded => TableStyle::Rounded,
            StyleChoice::Sharp => TableStyle::Sharp,
            StyleChoice::Modern => TableStyle::Modern,
            StyleChoice::Markdown => TableStyle::Markdown,
            StyleChoice::Dots => TableStyle::Dots,
            StyleChoice::Blank => TableStyle::Blank,
        }
    }
}

/// Sharded counter under contention.
///
/// Spawns concurrent writers incrementing one counter on an in-memory
/// transactional store, then reports the total, the shard count and what
/// the operations went through.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of concurrent writer threads
    #[arg(short = 'n', long, default_value = "8")]
    writers: usize,

    /// Increments per writer
    #[arg(short, long, default_value = "1000")]
    increments: usize,

    /// Shard id width in bytes (default: sized for the writer count)
    #[arg(long)]
    width: Option<u8>,

    /// Store without atomic add (shards are read-modify-written)
    #[arg(long)]
    no_atomic_add: bool,

    /// Compact once all writers are done
    #[arg(long)]
    compact: bool,

    /// Probability that an increment runs a partial coalesce
    #[arg(long, default_value = "0.0")]
    coalesce: f64,

    /// Attempts per operation
    #[arg(long, default_value = "5")]
    max_attempts: u32,

    /// Counter name
    #[arg(long, default_value = "demo")]
    namespace: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Table style (for table/compact formats)
    #[arg(short, long, value_enum, default_value = "rounded")]
    style: StyleChoice,

    /// Number of columns (for compact format)
    #[arg(short, long, default_value = "3")]
    columns: usize,

    /// Pretty print JSON output
    #[arg(long)]
    pretty: bool,

    /// Include timestamp in JSON output
    #[arg(long)]
    timestamp: bool,

    /// Add a title to the output (table formats)
    #[arg(long)]
    title: Option<String>,
}

fn render_output(args: &Args, snapshot: &StatsSnapshot) -> String {
    match args.format {
        OutputFormat::Table => {
            let mut observer = TableObserver::new().with_style(args.style.into());
            if let Some(ref title) = args.title {
                observer = observer.with_title(title.clone());
            }
            observer.render([snapshot])
        }

        OutputFormat::Compact => {
            let mut observer = TableObserver::new()
                .compact(true)
                .columns(args.columns)
                .separator(CompactSeparator::Colon)
                .show_zero(false)
                .with_style(args.style.into());
            if let Some(ref title) = args.title {
                observer = observer.with_title(title.clone());
            }
            observer.render([snapshot])
        }

        OutputFormat::Json => JsonObserver::new()
            .pretty(args.pretty)
            .wrap_in_report(args.timestamp)
            .include_timestamp(args.timestamp)
            .to_json([snapshot])
            .unwrap_or_else(|e| format!("Error: {}", e)),
    }
}

/// Total failed increments across writers. A panicked writer's panic is
/// re-raised, since its completed increments are unknown.
fn join_writers(handles: Vec<JoinHandle<usize>>) -> usize {
    handles
        .into_iter()
        .map(|handle| handle.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
        .sum()
}

fn build_config(args: &Args) -> Result<CounterConfig, String> {
    let width = match args.width {
        Some(bytes) => ShardIdWidth::try_from(bytes)?,
        None => ShardIdWidth::for_collision_target(args.writers as u64, DEFAULT_COLLISION_TARGET),
    };
    Ok(CounterConfig::new()
        .with_shard_id_width(width)
        .with_max_attempts(args.max_attempts)
        .with_coalesce_probability(args.coalesce))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            std::process::exit(2);
        }
    };
    let store = if args.no_atomic_add {
        MemoryStore::without_atomic_add()
    } else {
        MemoryStore::new()
    };
    let counter = match ShardedCounter::with_config(
        store.clone(),
        Namespace::new(&args.namespace),
        config,
    ) {
        Ok(counter) => Arc::new(counter),
        Err(err) => {
            eprintln!("Error: {}", err);
            std::process::exit(2);
        }
    };

    info!(
        writers = args.writers,
        increments = args.increments,
        width = %counter.config().shard_id_width,
        "starting writers"
    );

    let started = Instant::now();
    let mut handles = vec![];
    for _ in 0..args.writers {
        let counter = Arc::clone(&counter);
        let increments = args.increments;
        handles.push(thread::spawn(move || {
            let mut failed = 0usize;
            for _ in 0..increments {
                if counter.increment(1).is_err() {
                    failed += 1;
                }
            }
            failed
        }));
    }

    let failed = join_writers(handles);
    let elapsed = started.elapsed();

    info!(
        elapsed_ms = elapsed.as_millis() as u64,
        failed,
        conflicts = store.conflicts(),
        "writers done"
    );

    if args.compact {
        match counter.compact() {
            Ok(report) => info!(
                shards = report.shards_before,
                total = report.total,
                "compacted"
            ),
            Err(err) => eprintln!("Compaction failed: {}", err),
        }
    }

    match counter.snapshot() {
        Ok(snapshot) => println!("{}", render_output(&args, &snapshot)),
        Err(err) => {
            eprintln!("Error: {}", err);
            std::process::exit(1);
        }
    }

    let expected = (args.writers * args.increments - failed) as i64;
    eprintln!(
        "expected total {} ({} increments gave up), {} store conflicts, {:?}",
        expected,
        failed,
        store.conflicts(),
        elapsed
    );
}
