//! savefs CLI - Inspect and edit a savefs store from the command line.
//!
//! Usage:
//!   savefs [--store FILE | --memory | --config FILE] <command>
//!
//! Examples:
//!   savefs write app/data/save.json '{"score":1}'   # Write a text file
//!   savefs read app/data/save.json                  # Print it
//!   savefs ls -r app                                # Tree listing
//!   savefs mv app/data/save.json app/data/old.json  # Rename
//!   savefs rm -r app                                # Remove a subtree
//!   savefs autosave app/data/session.json --ticks 600
//!
//! Logging respects `RUST_LOG` (e.g. `RUST_LOG=savefs_core=debug`).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use savefs_core::{
    AppFs, CoalescingWriteQueue, DirEntry, SavefsConfig, StoreConfig, VfsError, VirtualFs,
};

/// Default durable store location when no flag or config names one.
const DEFAULT_STORE: &str = "savefs-store.json";

/// savefs CLI
#[derive(Parser, Debug)]
#[command(name = "savefs")]
#[command(about = "Read and write a savefs virtual filesystem")]
struct Args {
    /// Durable store document to open
    #[arg(short, long, conflicts_with = "memory")]
    store: Option<PathBuf>,

    /// Use a throwaway in-memory store
    #[arg(long)]
    memory: bool,

    /// JSON config file (store selection and queue options)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write text to a file, creating parent directories
    Write { path: String, text: String },
    /// Copy a host file into the store as bytes
    Import { path: String, host_file: PathBuf },
    /// Print a file as text
    Read { path: String },
    /// Print a file as a hex dump
    ReadBytes { path: String },
    /// Report whether a path exists
    Exists { path: String },
    /// Create a directory
    Mkdir {
        path: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// List a directory
    Ls {
        #[arg(default_value = "")]
        path: String,
        #[arg(short, long)]
        recursive: bool,
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a file or directory
    Rm {
        path: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Copy a file
    Cp { from: String, to: String },
    /// Move a file or directory
    Mv { from: String, to: String },
    /// Simulate a game loop autosaving a snapshot every tick
    Autosave {
        path: String,
        /// Number of ticks to simulate
        #[arg(long, default_value_t = 600)]
        ticks: u64,
        /// Enqueue a snapshot every N ticks
        #[arg(long, default_value_t = 1)]
        every: u64,
        /// Milliseconds per tick
        #[arg(long, default_value_t = 0)]
        tick_ms: u64,
    },
}

/// Snapshot written by the `autosave` command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionSnapshot {
    tick_count: u64,
    score: u64,
}

/// Work out the effective config: file first, then flags on top.
fn load_config(args: &Args) -> Result<SavefsConfig, VfsError> {
    let mut config = match &args.config {
        Some(path) => SavefsConfig::load(path)?,
        None => SavefsConfig {
            store: StoreConfig::Durable {
                path: PathBuf::from(DEFAULT_STORE),
            },
            ..SavefsConfig::default()
        },
    };

    if args.memory {
        config.store = StoreConfig::Memory;
    } else if let Some(path) = &args.store {
        config.store = StoreConfig::Durable { path: path.clone() };
    }
    Ok(config)
}

/// Read a file from the host for `import`, naming it in the error.
fn read_host_file(path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))
}

/// Print a listing as an indented tree.
fn print_tree(entries: &[DirEntry], depth: usize) {
    for entry in entries {
        let suffix = if entry.is_directory { "/" } else { "" };
        println!("{}{}{}", "  ".repeat(depth), entry.name, suffix);
        if let Some(children) = &entry.children {
            print_tree(children, depth + 1);
        }
    }
}

/// Print bytes 16 to a line, offset first.
fn print_hex(bytes: &[u8]) {
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        println!("{:08x}  {}", row * 16, hex.join(" "));
    }
}

async fn autosave(
    fs: &VirtualFs,
    config: &SavefsConfig,
    path: String,
    ticks: u64,
    every: u64,
    tick_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let saves = Arc::new(AtomicU64::new(0));
    let queue = {
        let fs = fs.clone();
        let saves = saves.clone();
        CoalescingWriteQueue::builder(move |snapshot: SessionSnapshot| {
            let fs = fs.clone();
            let path = path.clone();
            let saves = saves.clone();
            async move {
                fs.write_json(&path, &snapshot).await?;
                saves.fetch_add(1, Ordering::SeqCst);
                Ok::<(), VfsError>(())
            }
        })
        .options(config.queue)
        .on_error(|e, retries_left| {
            eprintln!("Autosave failed ({} retries left): {}", retries_left, e)
        })
        .build()
    };

    let every = every.max(1);
    let mut enqueued = 0u64;
    for tick in 1..=ticks {
        if tick % every == 0 {
            queue.enqueue(SessionSnapshot {
                tick_count: tick,
                score: tick * 10,
            });
            enqueued += 1;
        }
        if tick_ms > 0 {
            tokio::time::sleep(Duration::from_millis(tick_ms)).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
    queue.idle().await;

    println!(
        "{} ticks, {} snapshots enqueued, {} saves written",
        ticks,
        enqueued,
        saves.load(Ordering::SeqCst)
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let fs = VirtualFs::open(&config.store).await?;

    match args.command {
        Command::Write { path, text } => fs.write_text_file(&path, &text).await?,
        Command::Import { path, host_file } => {
            let data = read_host_file(&host_file)?;
            fs.write_file(&path, &data).await?;
            eprintln!("Imported {} bytes into {}", data.len(), path);
        }
        Command::Read { path } => print!("{}", fs.read_text_file(&path).await?),
        Command::ReadBytes { path } => print_hex(&fs.read_file(&path).await?),
        Command::Exists { path } => println!("{}", fs.exists(&path).await?),
        Command::Mkdir { path, recursive } => fs.mkdir(&path, recursive).await?,
        Command::Ls {
            path,
            recursive,
            json,
        } => {
            let entries = fs.read_dir(&path, recursive).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_tree(&entries, 0);
            }
        }
        Command::Rm { path, recursive } => fs.remove(&path, recursive).await?,
        Command::Cp { from, to } => fs.copy_file(&from, &to).await?,
        Command::Mv { from, to } => fs.rename(&from, &to).await?,
        Command::Autosave {
            path,
            ticks,
            every,
            tick_ms,
        } => autosave(&fs, &config, path, ticks, every, tick_ms).await?,
    }

    Ok(())
}
