use clap::{Parser, Subcommand};
use engine::config::{default_config_path, load_config};
use engine::session::{load_session, SessionInputs};
use log::warn;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tracelane")]
#[command(about = "Trace timeline inspector for process/file-system activity logs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a set of trace files and print a track summary
    Load {
        /// Delimited trace export
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Structured trace export with stacks and module lists
        #[arg(long)]
        xml: Option<PathBuf>,

        /// Sampling-profiler JSON capture
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Disk extent mapping
        #[arg(long)]
        diskify: Option<PathBuf>,

        /// Leave stack frames unresolved
        #[arg(long)]
        no_symbolicate: bool,
    },
    /// Print the resolved configuration
    Config,
}

async fn run_load(inputs: SessionInputs, no_symbolicate: bool) -> anyhow::Result<()> {
    let session = load_session(&inputs).await?;

    if !no_symbolicate && session.entries.iter().any(|e| e.stack.is_some()) {
        // Resolution needs a host-provided symbol source; none ships with
        // the command line front end.
        warn!("no symbol source configured, stacks keep their placeholders");
    }

    let aggregation = &session.aggregation;
    println!(
        "{} entries in {} tracks, {:.3}s span",
        session.entries.len(),
        aggregation.tracks.len(),
        aggregation.time_span()
    );
    for track in &aggregation.tracks {
        println!(
            "  [{:>2}] {:<40} {:>5} entries {:>10.3}s",
            track.index,
            track.operation,
            track.entries.len(),
            track.total_duration()
        );
    }
    if !session.read_records.is_empty() {
        let total: u64 = session.read_records.values().map(|r| r.total_bytes_read).sum();
        println!(
            "{} paths read, {} bytes total",
            session.read_records.len(),
            total
        );
    }
    if let Some(extent_map) = &session.extent_map {
        println!("extent data for {} paths", extent_map.len());
    }
    Ok(())
}

fn run_config() -> anyhow::Result<()> {
    let path = default_config_path()?;
    let config = load_config(&path)?;
    println!("config file: {}", path.display());
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Load {
            csv,
            xml,
            profile,
            diskify,
            no_symbolicate,
        } => {
            let inputs = SessionInputs {
                trace_csv: csv,
                trace_xml: xml,
                profile,
                diskify,
            };
            run_load(inputs, no_symbolicate).await
        }
        Commands::Config => run_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
