//! mapstore CLI
//!
//! Command-line interface for inspecting and exercising a data directory.

use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use mapstore::{CacheKey, CacheStore, Config, EntryOptions, EventDescriptor, EventStore};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

/// mapstore CLI
#[derive(Parser, Debug)]
#[command(name = "mapstore-cli")]
#[command(about = "Inspect and modify a mapstore data directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./mapstore_data")]
    data_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a string value in the cache
    CacheSet {
        key: String,
        value: String,

        /// Expire after this many seconds
        #[arg(long)]
        ttl_secs: Option<u64>,
    },

    /// Read a value from the cache
    CacheGet { key: String },

    /// Remove a value from the cache
    CacheRemove { key: String },

    /// Print cache allocator statistics
    CacheStats,

    /// Compact the cache file
    CacheCompact,

    /// Append an event to the log
    EventsAppend {
        aggregate_id: Uuid,
        event_type: String,
        version: i64,
        payload: String,

        #[arg(long, default_value = "default")]
        aggregate_type: String,
    },

    /// List events of an aggregate
    EventsList {
        aggregate_id: Uuid,

        #[arg(long, default_value = "0")]
        from_version: i64,
    },

    /// Scan the event log and report what recovery would find
    EventsVerify,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mapstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::builder().data_dir(&args.data_dir).build();

    if let Err(e) = run(config, args.command) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(config: Config, command: Commands) -> mapstore::Result<()> {
    match command {
        Commands::CacheSet { key, value, ttl_secs } => {
            let cache: CacheStore<String> = CacheStore::open(config)?;
            let mut options = EntryOptions::new();
            if let Some(secs) = ttl_secs {
                options = options.ttl(Duration::from_secs(secs));
            }
            cache.set(&CacheKey::from(key), &value, options)?;
            cache.close()?;
            println!("OK");
        }
        Commands::CacheGet { key } => {
            let cache: CacheStore<String> = CacheStore::open(config)?;
            match cache.get(&CacheKey::from(key))? {
                Some(entry) => println!("{}", entry.value),
                None => println!("(nil)"),
            }
            cache.close()?;
        }
        Commands::CacheRemove { key } => {
            let cache: CacheStore<String> = CacheStore::open(config)?;
            let removed = cache.remove(&CacheKey::from(key))?;
            cache.close()?;
            println!("{}", if removed { "1" } else { "0" });
        }
        Commands::CacheStats => {
            let cache: CacheStore<String> = CacheStore::open(config)?;
            let stats = cache.stats();
            println!("entries:        {}", stats.entries);
            println!("write cursor:   {}", stats.write_cursor);
            println!("free bytes:     {} in {} blocks", stats.free_bytes, stats.free_blocks);
            println!("fragmentation:  {:.3}", stats.fragmentation_ratio);
            println!("file length:    {}", stats.file_len);
            cache.close()?;
        }
        Commands::CacheCompact => {
            let cache: CacheStore<String> = CacheStore::open(config)?;
            let report = cache.compact()?;
            println!(
                "moved {} entries, dropped {} expired, reclaimed {} bytes",
                report.entries_moved, report.entries_expired, report.bytes_reclaimed
            );
            cache.close()?;
        }
        Commands::EventsAppend {
            aggregate_id,
            event_type,
            version,
            payload,
            aggregate_type,
        } => {
            let store = EventStore::open(config)?;
            let event = EventDescriptor::new(aggregate_type, aggregate_id, version, event_type, payload.into_bytes());
            let sequence = store.append(event)?;
            store.close()?;
            println!("sequence {}", sequence);
        }
        Commands::EventsList {
            aggregate_id,
            from_version,
        } => {
            let store = EventStore::open(config)?;
            for event in store.get_events(aggregate_id, from_version) {
                let event = event?;
                println!(
                    "#{} v{} {} {}",
                    event.sequence,
                    event.version,
                    event.event_type,
                    String::from_utf8_lossy(&event.payload)
                );
            }
        }
        Commands::EventsVerify => {
            let path = config.data_dir.join("events.log");
            let report = EventStore::verify(&path)?;
            println!("events:         {}", report.events_recovered);
            println!("last sequence:  {}", report.last_sequence);
            println!("end position:   {}", report.end_position);
            println!("torn tail:      {}", report.was_truncated);
        }
    }
    Ok(())
}
