//! Maintenance CLI for the viewlink trust cache.
//!
//! Record files are named by a one-way hash of the peer identity, so
//! listing shows file names; `show` and `remove` take the identity the
//! server authenticated as (its certificate Common Name).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use viewlink::trust::FileStore;

#[derive(Parser)]
#[command(name = "viewlink-certs")]
#[command(about = "Inspect and prune the trust-on-first-use certificate cache", long_about = None)]
struct Cli {
    /// Cache directory (defaults to ~/.local/share/viewlink/certs).
    #[arg(short, long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all stored trust records
    List,
    /// Show the record stored for an identity
    Show { identity: String },
    /// Remove the record stored for an identity
    Remove { identity: String },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let root = cli
        .root
        .or_else(FileStore::default_root)
        .ok_or("no home directory found, pass --root")?;
    let store = FileStore::open(root)?;

    match cli.command {
        Commands::List => {
            let records = store.list()?;
            if records.is_empty() {
                println!("no trust records in {}", store.root().display());
                return Ok(());
            }
            for (file, record) in records {
                println!(
                    "{}  expires={}  key_bytes={}",
                    file,
                    record.expires_unix,
                    record.key.len()
                );
            }
        }
        Commands::Show { identity } => match store.record(&identity) {
            Some(record) => {
                println!("identity:   {}", identity);
                println!("file:       {}", store.record_path(&identity).display());
                println!("expires:    {}", record.expires_unix);
                println!("key bytes:  {}", record.key.len());
            }
            None => {
                eprintln!("no record for '{}'", identity);
                std::process::exit(1);
            }
        },
        Commands::Remove { identity } => {
            if store.remove(&identity)? {
                println!("removed record for '{}'", identity);
            } else {
                eprintln!("no record for '{}'", identity);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
