//! artisan-price - command-line front end for the price predictor.
//!
//! ```bash
//! # Verify that every artifact in the asset directory loads
//! artisan-price check --assets ./models
//!
//! # Predict a price
//! artisan-price predict --assets ./models \
//!     --description "A hand-knitted woolen scarf, extra long." \
//!     --details "Deep red, 180cm x 30cm, soft merino wool." \
//!     --materials "100% Merino Wool, natural dye." \
//!     --production-time 1.0 --market Luxury
//! ```

use anyhow::{Context, Result};
use artisan_inference::{FieldValue, PricePredictor, RawInput};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Predict selling prices of handmade products from a pre-fit pipeline.
#[derive(Parser, Debug)]
#[command(name = "artisan-price")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load the manifest and every artifact, and report the feature layout
    Check(CheckCommand),

    /// Predict the price of one product
    Predict(PredictCommand),
}

#[derive(Args, Debug)]
struct CheckCommand {
    /// Directory holding manifest.json and the artifact files
    #[arg(long, short = 'a', default_value = ".")]
    assets: PathBuf,
}

impl CheckCommand {
    fn run(&self) -> Result<()> {
        let predictor = load_predictor(&self.assets)?;
        let manifest = predictor.manifest();
        let selector = &predictor.artifacts().selector;

        println!("schema version:   {}", manifest.schema_version);
        for name in manifest.artifact_names() {
            println!("loaded:           {}", name);
        }
        println!("numeric fields:   {}", manifest.numeric_fields.len());
        println!("assembled width:  {}", predictor.expected_feature_width());
        println!("selector width:   {}", selector.width());
        println!("selected width:   {}", selector.n_selected());

        if predictor.expected_feature_width() != selector.width() {
            anyhow::bail!(
                "assembled width {} does not match selector width {}",
                predictor.expected_feature_width(),
                selector.width()
            );
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
struct PredictCommand {
    /// Directory holding manifest.json and the artifact files
    #[arg(long, short = 'a', default_value = ".")]
    assets: PathBuf,

    /// JSON file with the raw record
    #[arg(long, short = 'i')]
    input: Option<PathBuf>,

    /// Product description
    #[arg(long)]
    description: Option<String>,

    /// Product details/features (e.g. color, size)
    #[arg(long)]
    details: Option<String>,

    /// Materials used
    #[arg(long)]
    materials: Option<String>,

    /// Production time in hours
    #[arg(long)]
    production_time: Option<f64>,

    /// Target market segment (Luxury, Mid-Range, Budget)
    #[arg(long)]
    market: Option<String>,

    /// Extra raw field as name=value; numeric values are sent as numbers
    #[arg(long = "field", short = 'f', value_parser = parse_field)]
    fields: Vec<(String, FieldValue)>,

    /// Print the full prediction report as JSON
    #[arg(long)]
    json: bool,
}

impl PredictCommand {
    fn run(&self) -> Result<()> {
        let predictor = load_predictor(&self.assets)?;
        let raw = self.raw_input()?;

        let prediction = predictor
            .predict_detailed(&raw)
            .with_context(|| "prediction failed")?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&prediction)?);
            return Ok(());
        }

        println!("Predicted selling price: {}", prediction);
        for encoding in &prediction.encodings {
            let label = encoding.label.as_deref().unwrap_or("<missing>");
            let note = if encoding.fell_back { " (default)" } else { "" };
            println!(
                "Field '{}' value '{}' was internally encoded as '{}'{}.",
                encoding.field, label, encoding.code, note
            );
        }
        Ok(())
    }

    fn raw_input(&self) -> Result<RawInput> {
        let mut raw = match &self.input {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading input {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing input {}", path.display()))?
            }
            None => RawInput::new(),
        };

        let text_flags = [
            ("description", &self.description),
            ("details", &self.details),
            ("materials", &self.materials),
            ("target_market", &self.market),
        ];
        for (name, value) in text_flags {
            if let Some(value) = value {
                raw.insert(name, value.as_str());
            }
        }
        if let Some(hours) = self.production_time {
            raw.insert("production_time", hours);
        }
        for (name, value) in &self.fields {
            raw.insert(name.as_str(), value.clone());
        }

        Ok(raw)
    }
}

fn parse_field(arg: &str) -> std::result::Result<(String, FieldValue), String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", arg))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing field name in '{}'", arg));
    }

    let value = match value.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => FieldValue::Number(n),
        _ => FieldValue::Text(value.to_string()),
    };
    Ok((name.to_string(), value))
}

fn load_predictor(dir: &Path) -> Result<PricePredictor> {
    info!(assets = %dir.display(), "Loading pricing pipeline");
    PricePredictor::from_dir(dir)
        .with_context(|| format!("cannot serve predictions from {}", dir.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("artisan_inference=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check(cmd) => cmd.run()?,
        Commands::Predict(cmd) => cmd.run()?,
    }

    Ok(())
}
