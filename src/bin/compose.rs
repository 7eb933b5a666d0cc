//! Schema Compose CLI
//!
//! Composes schema fragments and prints the resolved schema.

use std::path::PathBuf;

use atlas_alert_codec::config::OutputFormat;
use atlas_alert_codec::CodecConfig;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-compose")]
#[command(about = "Resolve schema fragments into one schema")]
struct Cli {
    /// Schema fragments, lowest-level dependency first. Defaults to the
    /// configured (or embedded) fragments.
    schemas: Vec<PathBuf>,

    /// Print the Avro parsing canonical form instead of the expanded schema
    #[arg(long)]
    canonical: bool,

    /// Output file
    #[arg(short, long)]
    output: Option<PathBuf>,

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
    let config = CodecConfig::load_from(cli.config.as_deref())?;
    let schema = config.compose_schema_from(&cli.schemas)?;

    let text = if cli.canonical {
        schema.canonical_form()
    } else {
        match config.display.format {
            OutputFormat::Pretty => serde_json::to_string_pretty(schema.json())?,
            OutputFormat::Compact => serde_json::to_string(schema.json())?,
        }
    };

    if let Some(path) = cli.output {
        std::fs::write(&path, &text)?;
        println!("✅ Schema {} written to {:?}", schema.name().unwrap_or_default(), path);
    } else {
        println!("{}", text);
    }
    Ok(())
}
