//! Trains a crop-yield model from a CSV table and saves the bundle.
//!
//! # Usage
//! ```sh
//! cargo run --bin train_yield -- --input data/crop_yield.csv --output models/yield_model.json
//! cargo run --bin train_yield -- --target Crop --features State,Season,Annual_Rainfall,Area
//! ```
//!
//! A categorical target (`Crop`, `State`, `Season`) trains a random forest
//! classifier instead and saves a recommender bundle to `RECOMMENDER_PATH`.
//!
//! Flags override the `MODEL_KIND`, `N_TREES`, `MAX_DEPTH`,
//! `MIN_SAMPLES_SPLIT`, `TEST_SIZE` and `RANDOM_SEED` environment variables.

use agrodata::application::ml::classifier::ClassificationMetrics;
use agrodata::application::ml::evaluation::RegressionMetrics;
use agrodata::application::ml::preprocessing::CleaningSummary;
use agrodata::application::ml::regressor::ModelKind;
use agrodata::application::ml::trainer::Trainer;
use agrodata::config::{ModelEnvConfig, TrainingEnvConfig};
use agrodata::domain::ml::feature_registry::{Field, default_features, feature_names};
use agrodata::infrastructure::dataset::load_crop_table;
use agrodata::infrastructure::persistence::{save_bundle, save_recommender};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the crop-yield CSV
    #[arg(long, default_value = "data/crop_yield.csv")]
    input: PathBuf,

    /// Where to write the bundle (defaults to MODEL_PATH, or
    /// RECOMMENDER_PATH for a categorical target)
    #[arg(long)]
    output: Option<PathBuf>,

    /// random-forest or linear
    #[arg(long)]
    model: Option<String>,

    /// Column to predict; a categorical column trains a classifier
    #[arg(long, default_value = "Yield")]
    target: String,

    /// Comma-separated feature columns (default: every known feature present)
    #[arg(long, value_delimiter = ',')]
    features: Vec<String>,

    /// Number of trees in the random forest
    #[arg(long)]
    n_trees: Option<usize>,

    /// Maximum depth of trees
    #[arg(long)]
    max_depth: Option<u16>,

    /// Minimum samples required to split an internal node
    #[arg(long)]
    min_split: Option<usize>,

    /// Share of rows held out for evaluation
    #[arg(long)]
    test_size: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// K-fold cross-validation before the final fit (0 = skip)
    #[arg(long, default_value_t = 0)]
    cv_folds: usize,
}

fn print_cleaning(summary: &CleaningSummary) {
    println!("\n══════════════════════════════════════════════════════");
    println!("  DATA CLEANING");
    println!("══════════════════════════════════════════════════════");
    println!("  Rows loaded:              {:>8}", summary.original_rows);
    println!("  After dropping missing:   {:>8}", summary.after_missing);
    for (column, median) in &summary.imputed {
        println!("  Imputed {:<17} median {:.4}", column, median);
    }
    if summary.seasons_filled > 0 {
        println!("  Seasons filled:           {:>8}", summary.seasons_filled);
    }
    for (column, removed) in &summary.outliers_removed {
        println!("  Outliers in {:<13} {:>8}", column, removed);
    }
    println!("  Rows kept:                {:>8}", summary.cleaned_rows);
}

fn print_metrics(label: &str, metrics: Option<&RegressionMetrics>) {
    match metrics {
        Some(m) => println!(
            "  {:<6} R²={:>8.4}  MAE={:>10.4}  RMSE={:>10.4}  (n={})",
            label, m.r2, m.mae, m.rmse, m.samples
        ),
        None => println!("  {:<6} no rows", label),
    }
}

fn print_accuracy(label: &str, metrics: Option<&ClassificationMetrics>) {
    match metrics {
        Some(m) => println!("  {:<6} accuracy={:>8.4}  (n={})", label, m.accuracy, m.samples),
        None => println!("  {:<6} no rows", label),
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = Args::parse();

    let env = TrainingEnvConfig::from_env()?;
    let mut config = env.trainer_config();
    if let Some(model) = &args.model {
        config.model_kind = ModelKind::from_str(model)?;
    }
    if let Some(n_trees) = args.n_trees {
        config.forest.n_trees = n_trees;
    }
    if args.max_depth.is_some() {
        config.forest.max_depth = args.max_depth;
    }
    if let Some(min_split) = args.min_split {
        config.forest.min_samples_split = min_split;
    }
    if let Some(test_size) = args.test_size {
        anyhow::ensure!(
            (0.0..1.0).contains(&test_size),
            "--test-size must be in [0, 1), got {}",
            test_size
        );
        config.test_fraction = test_size;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
        config.forest.seed = seed;
    }

    let table = load_crop_table(&args.input)?;
    let target = Field::from_str(&args.target)?;
    let output = match args.output.clone() {
        Some(path) => path,
        None if target.is_categorical() => ModelEnvConfig::from_env()?.recommender_path,
        None => ModelEnvConfig::from_env()?.model_path,
    };
    let features = if args.features.is_empty() {
        let mut features = default_features(table.has_field(Field::Season));
        features.retain(|f| *f != target);
        features
    } else {
        args.features
            .iter()
            .map(|f| Field::from_str(f.trim()))
            .collect::<Result<Vec<_>>>()?
    };
    info!("Features: {:?}", feature_names(&features));

    let trainer = Trainer::new(config);

    if target.is_categorical() {
        if args.cv_folds > 0 {
            warn!("--cv-folds is ignored for a categorical target");
        }
        if config.model_kind != ModelKind::RandomForest {
            warn!("Categorical targets are always fit with a random forest classifier");
        }
        let outcome = trainer
            .fit_classifier(&table, target, &features)
            .context("Training failed")?;

        print_cleaning(&outcome.cleaning);
        println!("\n══════════════════════════════════════════════════════");
        println!(
            "  {} classifier, {} classes ({} train / {} test)",
            target,
            outcome.bundle.classes.len(),
            outcome.train_rows,
            outcome.test_rows
        );
        println!("══════════════════════════════════════════════════════");
        print_accuracy("Train", outcome.report.train.as_ref());
        print_accuracy("Test", outcome.report.test.as_ref());

        save_recommender(&outcome.bundle, &output)?;
        println!("\nRecommender saved to {:?}", output);
        return Ok(());
    }

    if args.cv_folds > 0 {
        let cv = trainer
            .cross_validate(&table, target, &features, args.cv_folds)
            .context("Cross-validation failed")?;
        println!("\n══════════════════════════════════════════════════════");
        println!("  CROSS-VALIDATION ({} folds)", cv.fold_scores.len());
        println!("══════════════════════════════════════════════════════");
        for (i, score) in cv.fold_scores.iter().enumerate() {
            println!("  Fold {:>2}: R²={:.4}", i + 1, score);
        }
        println!("  Mean R²={:.4} ± {:.4}", cv.mean_r2, cv.std_r2);
    }

    let outcome = trainer
        .fit(&table, target, &features)
        .context("Training failed")?;

    print_cleaning(&outcome.cleaning);
    println!("\n══════════════════════════════════════════════════════");
    println!(
        "  {} ({} train / {} test)",
        config.model_kind, outcome.train_rows, outcome.test_rows
    );
    println!("══════════════════════════════════════════════════════");
    print_metrics("Train", outcome.report.train.as_ref());
    print_metrics("Test", outcome.report.test.as_ref());

    save_bundle(&outcome.bundle, &output)?;
    println!("\nModel saved to {:?}", output);
    Ok(())
}
