//! CFSTORE example flow
//!
//! Runs the scripted key lifecycle against an in-memory journal and logs
//! every state transition.

use clap::{Parser, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use cfstore::flow::{ExampleFlow, FLOW_VALUE};
use cfstore::journal::{CompletionMode, MemoryJournal, MemoryMedia};
use cfstore::{Cfstore, Config};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Sync,
    Async,
}

/// CFSTORE example flow
#[derive(Parser, Debug)]
#[command(name = "cfstore-flow")]
#[command(about = "Run the CFSTORE example flow against an in-memory journal")]
#[command(version)]
struct Args {
    /// Journal completion mode
    #[arg(short, long, value_enum, default_value = "sync")]
    mode: Mode,

    /// Simulated media size in KiB
    #[arg(short = 's', long, default_value = "64")]
    media_kb: usize,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cfstore=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    tracing::info!("CFSTORE flow v{} ({:?} mode)", cfstore::VERSION, args.mode);

    let config = Config::builder().max_area_size(args.media_kb * 1024).build();
    let completion = match args.mode {
        Mode::Sync => CompletionMode::Sync,
        Mode::Async => CompletionMode::Async,
    };
    let media = MemoryMedia::new(config.max_area_size);
    let journal = MemoryJournal::with_mode(media.clone(), config.program_unit, completion);

    let store = match Cfstore::new(config, Box::new(journal)) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to build store: {}", e);
            std::process::exit(1);
        }
    };

    match ExampleFlow::new(store).run() {
        Ok((report, _)) => {
            let intact = report.value_read == FLOW_VALUE;
            tracing::info!(
                transitions = report.transitions.len(),
                callbacks = report.callbacks,
                key = %report.key_name,
                value_len = report.value_len,
                intact,
                commits = media.commit_count(),
                "flow finished"
            );
            if !intact {
                std::process::exit(2);
            }
        }
        Err(e) => {
            tracing::error!("Flow failed: {} (code {})", e, e.code());
            std::process::exit(1);
        }
    }
}
