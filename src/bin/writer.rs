//! Alert Writer CLI
//!
//! Builds alerts from a JSON data file, attaches cutout stamps and writes
//! them as schemaless messages or as one bulk container.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use atlas_alert_codec::{
    decode, embed, encode, read_bulk_file, report, stamp_originals, write_bulk_file, CodecConfig, Record,
    ResolvedSchema, StampOriginals, Value,
};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "alert-write")]
#[command(about = "Encode alerts from JSON data, with optional cutout stamps")]
struct Cli {
    /// Schema fragments, lowest-level dependency first
    schemas: Vec<PathBuf>,

    /// JSON file holding one alert object or an array of them
    #[arg(long)]
    data: PathBuf,

    /// File for science image postage stamp
    #[arg(long)]
    cutout_sci: Option<PathBuf>,

    /// File for template image postage stamp
    #[arg(long)]
    cutout_temp: Option<PathBuf>,

    /// File for difference image postage stamp
    #[arg(long)]
    cutout_diff: Option<PathBuf>,

    /// Output file (or directory, for several schemaless messages)
    #[arg(short, long, default_value = "alert.avro")]
    output: PathBuf,

    /// Write every alert into one self-describing container
    #[arg(long)]
    bulk: bool,

    /// Decode what was written and check the stamps
    #[arg(long)]
    read_back: bool,

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

fn load_records(path: &Path, originals: &StampOriginals) -> anyhow::Result<Vec<Record>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text)?;
    let items = match json {
        serde_json::Value::Array(items) => items,
        single => vec![single],
    };

    let mut records = Vec::with_capacity(items.len());
    for item in &items {
        let mut record = Record::from_json(item)?;
        for (field, stamp_path) in originals {
            embed(&mut record, *field, stamp_path)
                .with_context(|| format!("embedding {}", stamp_path.display()))?;
        }
        records.push(record);
    }
    Ok(records)
}

fn message_path(dir: &Path, record: &Record, index: usize) -> PathBuf {
    match record.get("alertId") {
        Some(Value::Int(id)) => dir.join(format!("alert_{id}.avro")),
        _ => dir.join(format!("alert_{index}.avro")),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = CodecConfig::load_from(cli.config.as_deref())?;
    let schema = config.compose_schema_from(&cli.schemas)?;
    let originals = stamp_originals(cli.cutout_sci.clone(), cli.cutout_temp.clone(), cli.cutout_diff.clone());
    let records = load_records(&cli.data, &originals)?;

    if records.is_empty() {
        bail!("no alerts in {}", cli.data.display());
    }

    if cli.bulk {
        let count = write_bulk_file(&cli.output, &schema, &records, config.container.codec)?;
        println!("✅ Wrote {} alerts to {}", count, cli.output.display());

        if cli.read_back {
            for record in read_bulk_file(&cli.output, None)? {
                println!("{}", report(&record?, &config, &originals)?);
            }
        }
        return Ok(());
    }

    let paths: Vec<PathBuf> = if records.len() == 1 {
        vec![cli.output.clone()]
    } else {
        std::fs::create_dir_all(&cli.output)?;
        records
            .iter()
            .enumerate()
            .map(|(i, r)| message_path(&cli.output, r, i))
            .collect()
    };

    for (record, path) in records.iter().zip(&paths) {
        let bytes = encode(record, &schema)?;
        std::fs::write(path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "wrote schemaless message");

        if cli.read_back {
            read_back(&bytes, &schema, &config, &originals)?;
        }
    }
    println!("✅ Wrote {} schemaless message(s)", paths.len());
    Ok(())
}

fn read_back(bytes: &[u8], schema: &ResolvedSchema, config: &CodecConfig, originals: &StampOriginals) -> anyhow::Result<()> {
    let record = decode(bytes, schema)?;
    println!("{}", report(&record, config, originals)?);
    println!("size in bytes of avro message: {}", bytes.len());
    Ok(())
}

