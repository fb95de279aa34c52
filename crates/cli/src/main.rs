//! SiltDB command-line front end.
//!
//! A thin wrapper over [`siltdb::Db`] for poking at a database directory:
//!
//! ```text
//! silt --dir ./data put mykey myvalue
//! silt --dir ./data get mykey
//! silt --dir ./data del mykey
//! ```

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use siltdb::Db;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SiltDB embedded key-value store")]
struct Cli {
    /// Database directory (created if missing).
    #[arg(long, default_value = "./data", env = "SILT_DIR")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a key-value pair.
    Put { key: String, value: String },
    /// Look up a key.
    Get { key: String },
    /// Delete a key.
    Del { key: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // the engine requires an existing directory
    fs::create_dir_all(&cli.dir)
        .with_context(|| format!("failed to create {}", cli.dir.display()))?;

    let mut db = Db::open(&cli.dir)?;

    match cli.command {
        Command::Put { key, value } => {
            db.put(key.as_bytes(), value.as_bytes())?;
        }
        Command::Get { key } => match db.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => {
                eprintln!("key not found");
                std::process::exit(1);
            }
        },
        Command::Del { key } => {
            db.delete(key.as_bytes())?;
        }
    }

    db.close()?;

    Ok(())
}
