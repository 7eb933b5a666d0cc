//! Alert Reader CLI
//!
//! Reads alert messages, prints them without their stamps, extracts the
//! stamps and checks them against the original cutout files.

use std::path::PathBuf;

use atlas_alert_codec::{decode_file, read_bulk_file, report, stamp_originals, CodecConfig};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "alert-read")]
#[command(about = "Decode alert messages and verify their stamps")]
struct Cli {
    /// Message file
    message: PathBuf,

    /// Schema fragments, lowest-level dependency first
    schemas: Vec<PathBuf>,

    /// Apply the schema to a single schemaless message. Otherwise the schema
    /// embedded in the container is used.
    #[arg(long)]
    schemaless: bool,

    /// Project container records onto the composed schema
    #[arg(long)]
    project: bool,

    /// Original science stamp to compare against
    #[arg(long)]
    cutout_sci: Option<PathBuf>,

    /// Original template stamp to compare against
    #[arg(long)]
    cutout_temp: Option<PathBuf>,

    /// Original difference stamp to compare against
    #[arg(long)]
    cutout_diff: Option<PathBuf>,

    /// Where extracted stamps are written
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Config file
    #[arg(short, long)]
    config: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = CodecConfig::load_from(cli.config.as_deref())?;
    if let Some(dir) = &cli.output_dir {
        config.stamps.output_dir = dir.clone();
    }

    let originals = stamp_originals(cli.cutout_sci.clone(), cli.cutout_temp.clone(), cli.cutout_diff.clone());

    if cli.schemaless {
        let schema = config.compose_schema_from(&cli.schemas)?;
        let record = decode_file(&cli.message, &schema)?;
        println!("{}", report(&record, &config, &originals)?);
        return Ok(());
    }

    let reader_schema = if cli.project {
        Some(config.compose_schema_from(&cli.schemas)?)
    } else {
        None
    };

    let mut count = 0usize;
    for record in read_bulk_file(&cli.message, reader_schema.as_ref())? {
        println!("{}", report(&record?, &config, &originals)?);
        count += 1;
    }
    println!("📦 {} alert(s) read from {}", count, cli.message.display());
    Ok(())
}

