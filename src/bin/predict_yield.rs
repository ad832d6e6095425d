//! Predicts crop yield from a saved model bundle.
//!
//! # Usage
//! ```sh
//! cargo run --bin predict_yield -- single --crop Rice --state Assam --area 120 --confidence
//! cargo run --bin predict_yield -- batch --input new_rows.csv --output predictions.csv
//! cargo run --bin predict_yield -- recommend --state Assam --season Kharif --rainfall 2100 --area 120
//! cargo run --bin predict_yield -- recommend --input fields.csv --output recommended.csv
//! ```
//!
//! The yield bundle comes from `--model` or `MODEL_PATH`; `recommend` reads
//! the crop recommender from `--model` or `RECOMMENDER_PATH`.

use agrodata::application::context::AppContext;
use agrodata::application::ml::crop_recommender::CropRecommender;
use agrodata::application::ml::prediction_service::{ErrorResponse, PredictionInput};
use agrodata::config::Config;
use agrodata::domain::ml::dataset::CropRecord;
use agrodata::infrastructure::dataset::{load_crop_table, write_predictions, write_recommendations};
use agrodata::infrastructure::persistence::load_recommender;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model bundle to load
    #[arg(long)]
    model: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Predict one record and print the response as JSON
    Single {
        #[arg(long)]
        crop: String,
        #[arg(long)]
        state: String,
        #[arg(long)]
        season: Option<String>,
        #[arg(long)]
        area: Option<String>,
        #[arg(long)]
        production: Option<String>,
        #[arg(long)]
        rainfall: Option<String>,
        #[arg(long)]
        fertilizer: Option<String>,
        #[arg(long)]
        pesticide: Option<String>,
        /// Include the ensemble confidence interval
        #[arg(long)]
        confidence: bool,
        /// Ensemble members used for the interval (default: all)
        #[arg(long)]
        ensemble_size: Option<usize>,
    },
    /// Predict every row of a CSV and write it back with a prediction column
    Batch {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Recommend a crop for one field (flags) or for every row of a CSV
    Recommend {
        #[arg(long, requires = "output")]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        crop: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        season: Option<String>,
        #[arg(long)]
        area: Option<f64>,
        #[arg(long)]
        production: Option<f64>,
        #[arg(long)]
        rainfall: Option<f64>,
        #[arg(long)]
        fertilizer: Option<f64>,
        #[arg(long)]
        pesticide: Option<f64>,
    },
}

fn number(raw: Option<String>) -> Option<Value> {
    raw.map(Value::String)
}

fn fail(response: &ErrorResponse) -> Result<()> {
    eprintln!("{}", serde_json::to_string_pretty(response)?);
    anyhow::bail!("{}", response.error)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(path) = args.model {
        config.model.model_path = path.clone();
        config.model.recommender_path = path;
    }
    // Nothing to serve without a model
    config.model.model_required = true;

    match args.command {
        Command::Single {
            crop,
            state,
            season,
            area,
            production,
            rainfall,
            fertilizer,
            pesticide,
            confidence,
            ensemble_size,
        } => {
            if ensemble_size.is_some() {
                config.model.confidence_ensemble_size = ensemble_size;
            }
            let ctx = AppContext::new(config).load_model()?;

            let input = PredictionInput {
                crop: Some(crop),
                state: Some(state),
                area: number(area),
                production: number(production),
                rainfall: number(rainfall),
                fertilizer: number(fertilizer),
                pesticide: number(pesticide),
                season,
            };

            match ctx.predictions().handle(&input) {
                Ok(mut response) => {
                    if !confidence {
                        response.confidence_interval = None;
                    }
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
                Err(response) => fail(&response)?,
            }
        }
        Command::Batch { input, output } => {
            let ctx = AppContext::new(config).load_model()?;
            let table = load_crop_table(&input)?;

            let predicted = match ctx.predictions().predict_batch(&table) {
                Ok(predicted) => predicted,
                Err(e) => return fail(&ErrorResponse::from(&e)),
            };
            if predicted.fallback_count() > 0 {
                info!(
                    "{} value(s) were not seen during training and used the default encoding",
                    predicted.fallback_count()
                );
            }
            write_predictions(&output, &predicted)
                .with_context(|| format!("Failed to write predictions to {:?}", output))?;
        }
        Command::Recommend {
            input,
            output,
            crop,
            state,
            season,
            area,
            production,
            rainfall,
            fertilizer,
            pesticide,
        } => {
            let recommender = CropRecommender::new(load_recommender(&config.model.recommender_path)?)?;
            let target = recommender.bundle().target.clone();

            match (input, output) {
                (Some(input), Some(output)) => {
                    let table = load_crop_table(&input)?;
                    let recommendations = match recommender.recommend_batch(&table) {
                        Ok(recommendations) => recommendations,
                        Err(e) => return fail(&ErrorResponse::from(&e)),
                    };
                    write_recommendations(&output, &table, &target, &recommendations)
                        .with_context(|| format!("Failed to write recommendations to {:?}", output))?;
                }
                _ => {
                    let record = CropRecord {
                        crop,
                        state,
                        season,
                        area,
                        production,
                        annual_rainfall: rainfall,
                        fertilizer,
                        pesticide,
                        ..Default::default()
                    };
                    match recommender.recommend(&record) {
                        Ok(recommendation) => {
                            println!("{}", serde_json::to_string_pretty(&recommendation)?)
                        }
                        Err(e) => fail(&ErrorResponse::from(&e))?,
                    }
                }
            }
        }
    }

    Ok(())
}
