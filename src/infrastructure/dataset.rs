//! CSV input and output for crop tables.

use crate::application::ml::crop_recommender::Recommendation;
use crate::application::ml::yield_predictor::PredictedTable;
use crate::domain::ml::dataset::{CropRecord, CropTable, FeatureSource};
use crate::domain::ml::feature_registry::Field;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tracing::{debug, info};

pub const PREDICTION_COLUMN: &str = "Predicted_Yield";
const CROP_YEAR_COLUMN: &str = "Crop_Year";

/// Reads a crop table from CSV. Column names and values are trimmed; blank
/// cells and the usual NA spellings load as missing. Columns the pipeline
/// does not use are kept with each row and written back with predictions.
pub fn load_crop_table(path: &Path) -> Result<CropTable> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let table = read_crop_table(BufReader::new(file))
        .with_context(|| format!("Failed to read crop table from {:?}", path))?;
    info!("Loaded {} rows from {:?}", table.len(), path);
    Ok(table)
}

pub fn read_crop_table<R: Read>(reader: R) -> Result<CropTable> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let headers = rdr.headers().context("Failed to read CSV header")?.clone();
    let columns: Vec<String> = headers.iter().map(str::to_string).collect();

    let unused: Vec<&String> = columns
        .iter()
        .filter(|c| Field::from_column(c).is_none() && c.as_str() != CROP_YEAR_COLUMN)
        .collect();
    if !unused.is_empty() {
        debug!("Columns passed through unused: {:?}", unused);
    }

    let mut records = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        // Line 1 is the header
        let line = i + 2;
        let row = result.with_context(|| format!("Invalid record on line {}", line))?;
        let mut record: CropRecord = row
            .deserialize(Some(&headers))
            .with_context(|| format!("Invalid record on line {}", line))?;
        record.raw = row.iter().map(str::to_string).collect();
        records.push(record);
    }
    Ok(CropTable::new(columns, records))
}

/// Writes every input column followed by the prediction column.
pub fn write_predictions(path: &Path, predicted: &PredictedTable) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    write_predictions_to(file, predicted)?;
    info!("Wrote {} predictions to {:?}", predicted.rows.len(), path);
    Ok(())
}

pub fn write_predictions_to<W: Write>(writer: W, predicted: &PredictedTable) -> Result<()> {
    let rows = predicted
        .rows
        .iter()
        .map(|row| (&row.record, row.prediction.value.to_string()));
    write_with_column(writer, &predicted.columns, PREDICTION_COLUMN, rows)
}

/// Writes every input column followed by `Recommended_<target>`.
pub fn write_recommendations(
    path: &Path,
    table: &CropTable,
    target: &str,
    recommendations: &[Recommendation],
) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    write_recommendations_to(file, table, target, recommendations)?;
    info!("Wrote {} recommendations to {:?}", recommendations.len(), path);
    Ok(())
}

pub fn write_recommendations_to<W: Write>(
    writer: W,
    table: &CropTable,
    target: &str,
    recommendations: &[Recommendation],
) -> Result<()> {
    anyhow::ensure!(
        table.len() == recommendations.len(),
        "{} rows but {} recommendations",
        table.len(),
        recommendations.len()
    );
    let column = format!("Recommended_{}", target);
    let rows = table
        .records
        .iter()
        .zip(recommendations)
        .map(|(record, r)| (record, r.label.clone()));
    write_with_column(writer, &table.columns, &column, rows)
}

/// Rows read from CSV are written back cell for cell; rows built in code
/// only have their known columns filled. A stale copy of `column` in the
/// input is replaced.
fn write_with_column<'a, W, I>(writer: W, columns: &[String], column: &str, rows: I) -> Result<()>
where
    W: Write,
    I: Iterator<Item = (&'a CropRecord, String)>,
{
    let kept: Vec<(usize, &str)> = columns
        .iter()
        .map(String::as_str)
        .enumerate()
        .filter(|(_, c)| *c != column)
        .collect();

    let mut wtr = WriterBuilder::new().from_writer(writer);
    let mut header: Vec<&str> = kept.iter().map(|(_, c)| *c).collect();
    header.push(column);
    wtr.write_record(&header)?;

    for (record, value) in rows {
        let mut fields: Vec<String> = if record.raw.len() == columns.len() {
            kept.iter().map(|(i, _)| record.raw[*i].clone()).collect()
        } else {
            kept.iter().map(|(_, c)| cell(record, c)).collect()
        };
        fields.push(value);
        wtr.write_record(&fields)?;
    }
    wtr.flush()?;
    Ok(())
}

fn cell(record: &CropRecord, column: &str) -> String {
    if column == CROP_YEAR_COLUMN {
        return record.crop_year.map(|y| y.to_string()).unwrap_or_default();
    }
    match Field::from_column(column) {
        Some(field) if field.is_categorical() => {
            record.categorical(field).unwrap_or_default().to_string()
        }
        Some(field) => record.numeric(field).map(|v| v.to_string()).unwrap_or_default(),
        None => String::new(),
    }
}
