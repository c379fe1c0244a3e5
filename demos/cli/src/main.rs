use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use order_core::{LabOrder, OrderTranslator, TranslationConfig};
use order_fhir::load_bundle_str;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "order-cli",
    about = "Translate lab orders against a FHIR JSON bundle of patient observations."
)]
struct Args {
    /// Path to the FHIR JSON bundle.
    #[arg(short, long)]
    bundle: PathBuf,

    /// Path to a lab order JSON file (one order or an array of orders).
    #[arg(short, long)]
    order: PathBuf,

    /// Optional JSON file overriding concept names.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Evaluate order status at this instant instead of now (RFC 3339).
    #[arg(long)]
    at: Option<DateTime<Utc>>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => serde_json::from_str::<TranslationConfig>(&read(path)?)
            .with_context(|| format!("Invalid config in {path:?}"))?,
        None => TranslationConfig::default(),
    };

    let record = load_bundle_str(&read(&args.bundle)?, &config)
        .with_context(|| format!("Could not load bundle {:?}", args.bundle))?;
    let orders = parse_orders(&read(&args.order)?)
        .with_context(|| format!("Invalid order in {:?}", args.order))?;

    let translator = OrderTranslator::new(&record.observations, &record.catalog, &config);
    let now = args.at.unwrap_or_else(Utc::now);

    for (order, result) in orders.iter().zip(translator.translate_batch(&orders, now)) {
        match result {
            Ok(translation) => println!("{}", serde_json::to_string_pretty(&translation)?),
            Err(err) => eprintln!("Order {}: {err}", order.id),
        }
    }

    Ok(())
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Could not read file {path:?}"))
}

fn parse_orders(data: &str) -> serde_json::Result<Vec<LabOrder>> {
    let value: serde_json::Value = serde_json::from_str(data)?;
    if value.is_array() {
        serde_json::from_value(value)
    } else {
        serde_json::from_value(value).map(|order| vec![order])
    }
}
