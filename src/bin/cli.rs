//! BucketDB CLI
//!
//! Inspect and maintain an existing index from the command line.

use std::path::Path;
use std::process;

use bucketdb::config::bucket_path;
use bucketdb::index::{DynHashIndex, IndexHeader};
use bucketdb::{Index, IndexEntry, Value};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// BucketDB CLI
#[derive(Parser, Debug)]
#[command(name = "bucketdb-cli")]
#[command(about = "Inspect and maintain BucketDB indexes")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./bucketdb_data")]
    data_dir: String,

    /// Index name
    #[arg(short, long, default_value = "main")]
    name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the index header
    Info,

    /// Count live, deleted and empty slots
    Stats,

    /// List live entries in slot order
    Dump {
        /// Number of live entries to skip
        #[arg(long, default_value = "0")]
        start_from: usize,

        /// Maximum number of entries to print
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Look up entries for a value (the key is derived by the index)
    Get {
        /// The lookup value
        value: String,
    },

    /// Drop tombstones
    Compact {
        /// Also rewrite the value store
        #[arg(long)]
        storage: bool,
    },

    /// Rebuild the table with a new capacity
    Reindex {
        /// New number of slots
        hash_lim: u64,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,bucketdb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> bucketdb::Result<()> {
    let mut index = match args.command {
        Commands::Info => return print_info(&args.data_dir, &args.name),
        _ => DynHashIndex::open_existing(&args.data_dir, &args.name)?,
    };

    match args.command {
        Commands::Info => {}
        Commands::Stats => {
            let stats = index.stats()?;
            println!("hash_lim: {}", stats.hash_lim);
            println!("live:     {}", stats.live);
            println!("deleted:  {}", stats.deleted);
            println!("empty:    {}", stats.empty);
        }
        Commands::Dump { start_from, limit } => {
            for entry in index.all(start_from, limit)? {
                print_entry(&entry?);
            }
        }
        Commands::Get { value } => {
            let key = index.make_key(&Value::Str(value))?;
            let entries: Vec<IndexEntry> = index.get_many(&key, 0, None)?.collect::<bucketdb::Result<_>>()?;
            if entries.is_empty() {
                println!("(not found)");
            }
            for entry in entries {
                print_entry(&entry);
                if let Some(doc) = index.storage()?.get(entry.start, entry.size, Some(entry.status))? {
                    println!("    {}", Value::Map(doc));
                }
            }
        }
        Commands::Compact { storage } => {
            if storage {
                index.compact_storage()?;
            } else {
                index.compact()?;
            }
        }
        Commands::Reindex { hash_lim } => {
            index.reindex(hash_lim)?;
        }
    }

    index.close_index()
}

fn print_info(data_dir: &str, name: &str) -> bucketdb::Result<()> {
    let header = IndexHeader::read_from(&bucket_path(Path::new(data_dir), name))?;
    println!("index:            {}", name);
    println!("format version:   {}", header.format_version);
    println!("created by:       {}", header.crate_version);
    println!("entry format:     {}", header.entry_line_format());
    println!("hash_lim:         {}", header.hash_lim);
    println!("allow duplicates: {}", header.allow_duplicates);
    println!("key strategy:     {} {:?}", header.strategy, header.params);
    println!("value codec:      {}", header.codec);
    Ok(())
}

fn print_entry(entry: &IndexEntry) {
    let key: String = entry.key.iter().map(|b| format!("{:02x}", b)).collect();
    println!(
        "slot={:<8} doc_id={} key={} start={} size={} status={:?}",
        entry.slot, entry.doc_id, key, entry.start, entry.size, entry.status
    );
}
