mod error;
mod export;
mod ingest;
mod parser;
mod row;
mod serialiser;
mod session;
mod srt;
mod store;

use crate::session::Session;
use crate::store::RowStore;

use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn main() {
    match run() {
        Ok(()) => (),
        Err(err) => {
            eprintln!("An error occurred: {}", err);
            for cause in err.chain().skip(1) {
                eprintln!("    {}", cause);
            }
            process::exit(1);
        }
    }
}

#[derive(ClapParser)]
#[command(about = "Build a bilingual subtitle dictionary and export it as tables or SRT")]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "DIR",
        help = "Where dictionaries are kept, one file per plate.",
        default_value = "plates"
    )]
    data_dir: PathBuf,
    #[arg(
        short,
        long,
        value_name = "DIR",
        help = "Where exported tables and subtitles are written.",
        default_value = "exports"
    )]
    export_dir: PathBuf,
    #[arg(
        short,
        long,
        value_name = "NAME",
        help = "The plate to work on. If not supplied, you will be asked for it."
    )]
    plate: Option<String>,
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log filter used when RUST_LOG is not set.",
        default_value = "warn"
    )]
    log_level: String,
    #[arg(long, help = "Skip adding entries and go straight to the export menu.")]
    export_only: bool,
}

fn init_tracing(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Ctrl-C must not lose what has been typed in so far.
fn install_interrupt_handler(store: Arc<RowStore>) -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\n{}", save_on_interrupt(&store));
        process::exit(130);
    })
    .context("Failed to install Ctrl-C handler")
}

fn save_on_interrupt(store: &RowStore) -> String {
    warn!("Interrupt received, saving before exit");
    match store.save() {
        Ok(Some(path)) => format!("Interrupted. Saved to {}", path.display()),
        Ok(None) => "Interrupted.".to_string(),
        Err(err) => format!("Interrupted, and saving failed: {:#}", err),
    }
}

fn run() -> Result<()> {
    let Cli {
        data_dir,
        export_dir,
        plate,
        log_level,
        export_only,
    } = Cli::parse();
    init_tracing(&log_level);

    let store = Arc::new(RowStore::new(data_dir));
    install_interrupt_handler(Arc::clone(&store))?;

    let stdin = io::stdin();
    let mut session = Session::new(&store, stdin.lock(), io::stdout(), export_dir);
    let plate = plate
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());
    session.run(plate, export_only)
}
