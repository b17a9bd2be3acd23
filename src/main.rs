use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use kaeya::{Config, Repository};

#[derive(Parser)]
#[command(name = "kaeya", version, about = "A log-structured, append-only key/value store")]
struct Cli {
    /// Path to a kaeya.toml; defaults to ./kaeya.toml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a value under a key.
    Set { key: String, value: String },
    /// Fetch the value stored under a key.
    Get { key: String },
    /// Print the resolved configuration and, for the segment backend, the
    /// current chain length and min/max segment IDs.
    Info,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    env_logger::Builder::new()
        .filter_level(config.log_level.as_level_filter())
        .init();

    match run(&config, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, command: Commands) -> Result<(), kaeya::EngineError> {
    let mut repo = Repository::open(config)?;

    match command {
        Commands::Set { key, value } => {
            repo.save(&kaeya::KV::new(key, value))?;
        }
        Commands::Get { key } => {
            let kv = repo.load(&key)?;
            println!("{}", kv.value);
        }
        Commands::Info => {
            println!("storage.system       = {:?}", config.storage_system);
            println!("storage.path         = {}", config.storage_path.display());
            println!("segment.buffer_size  = {}", config.buffer_size);
            println!("segment.merge_floor  = {}", config.merge_floor);
            if let Some(count) = repo.segment_count() {
                println!("segment chain        = {count} segment(s)");
                println!(
                    "segment min/max id   = {:?}/{:?}",
                    repo.min_segment_id(),
                    repo.max_segment_id()
                );
            }
        }
    }

    repo.close()
}
