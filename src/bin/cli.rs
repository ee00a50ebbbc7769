//! CFSTORE CLI
//!
//! Inspect and edit a file-backed store from the command line. Every
//! mutating command flushes before it exits.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use cfstore::journal::FileJournal;
use cfstore::record::{AccessControl, KeyFlags};
use cfstore::{Cfstore, ClientContext, Config, Handle, KeyDescriptor, Outcome, Result};

/// CFSTORE CLI
#[derive(Parser, Debug)]
#[command(name = "cfstore-cli")]
#[command(about = "Inspect and edit a CFSTORE configuration store")]
#[command(version)]
struct Args {
    /// Data directory holding the journal
    #[arg(short, long, default_value = "./cfstore_data")]
    data_dir: String,

    /// Media program unit in bytes
    #[arg(short, long, default_value = "8")]
    program_unit: usize,

    /// Largest area the store may commit, in KiB
    #[arg(short = 'a', long, default_value = "64")]
    area_kb: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a key holding a value
    Create {
        key: String,

        value: String,

        /// Reserve this many bytes instead of the value length
        #[arg(short, long)]
        capacity: Option<usize>,

        /// Make the key read-only after this write
        #[arg(long)]
        read_only: bool,
    },

    /// Overwrite the start of an existing key's value
    Write { key: String, value: String },

    /// Print a key's value
    Read { key: String },

    /// Delete a key
    Delete { key: String },

    /// List keys matching a pattern (one `*` allowed)
    Find {
        #[arg(default_value = "*")]
        pattern: String,
    },

    /// Print every key with its length and value bytes
    Dump,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cfstore=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    tracing::debug!("CFSTORE CLI v{}", cfstore::VERSION);

    if let Err(e) = run(args) {
        tracing::error!("{} (code {})", e, e.code());
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .program_unit(args.program_unit)
        .max_area_size(args.area_kb * 1024)
        .build();

    let journal = FileJournal::open(&config)?;
    let mut store = Cfstore::new(config, Box::new(journal))?;
    store.initialize(None, ClientContext::default())?;

    match args.command {
        Commands::Create {
            key,
            value,
            capacity,
            read_only,
        } => {
            let len = capacity.unwrap_or(value.len()).max(value.len());
            let acl = AccessControl::owner_read_write().with(AccessControl::OWNER_WRITE, !read_only);
            let descriptor = KeyDescriptor::new().acl(acl);
            let handle = handle_of(store.create(&key, len, Some(&descriptor))?)?;
            if !value.is_empty() {
                store.write(handle, value.as_bytes())?;
            }
            store.close(handle)?;
            store.flush()?;
            println!("created {} ({} bytes)", key, len);
        }
        Commands::Write { key, value } => {
            let handle = handle_of(store.open(&key, KeyFlags::read_write())?)?;
            let written = store.write(handle, value.as_bytes());
            store.close(handle)?;
            written?;
            store.flush()?;
            println!("wrote {} bytes to {}", value.len(), key);
        }
        Commands::Read { key } => {
            let opened = store.open(&key, KeyFlags::read_only())?;
            let handle = handle_of(opened)?;
            let mut buf = vec![0u8; opened.value().unwrap_or(0)];
            let count = store.read(handle, &mut buf)?.value().unwrap_or(0);
            store.close(handle)?;
            println!("{}", String::from_utf8_lossy(&buf[..count]));
        }
        Commands::Delete { key } => {
            let handle = handle_of(store.open(&key, KeyFlags::read_write())?)?;
            let deleted = store.delete(handle);
            store.close(handle)?;
            deleted?;
            store.flush()?;
            println!("deleted {}", key);
        }
        Commands::Find { pattern } => {
            for (name, len) in walk(&mut store, &pattern)? {
                println!("{}\t{}", name, len);
            }
        }
        Commands::Dump => {
            let keys = walk(&mut store, "*")?;
            println!("{} keys", keys.len());
            for (name, len) in keys {
                let opened = store.open(&name, KeyFlags::read_only())?;
                let handle = handle_of(opened)?;
                let mut buf = vec![0u8; len];
                let result = store.read(handle, &mut buf);
                store.close(handle)?;
                result?;
                println!("{}\t{}\t{}", name, len, hex(&buf));
            }
        }
    }

    store.uninitialize()?;
    Ok(())
}

/// Names and value lengths of every key matching `pattern`
fn walk(store: &mut Cfstore, pattern: &str) -> Result<Vec<(String, usize)>> {
    let mut keys = Vec::new();
    let mut prev = None;
    loop {
        let found = match store.find(pattern, prev) {
            Ok(outcome) => outcome,
            Err(e) if e.is_not_found() => break,
            Err(e) => return Err(e),
        };
        let handle = handle_of(found)?;
        let mut name = [0u8; 256];
        let len = store.get_key_name(handle, &mut name)?.value().unwrap_or(1);
        keys.push((
            String::from_utf8_lossy(&name[..len.saturating_sub(1)]).into_owned(),
            found.value().unwrap_or(0),
        ));
        prev = Some(handle);
    }
    Ok(keys)
}

fn handle_of(outcome: Outcome) -> Result<Handle> {
    outcome.handle().ok_or(cfstore::CfstoreError::InvalidHandle)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
