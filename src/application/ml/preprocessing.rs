//! Table cleaning ahead of training: drop incomplete rows, impute optional
//! columns, then strip outliers column by column with the IQR rule.

use super::stats::{iqr_bounds, median};
use crate::domain::ml::dataset::{CropRecord, CropTable, FeatureSource};
use crate::domain::ml::feature_registry::{Field, IMPUTED_COLUMNS, OUTLIER_COLUMNS, UNKNOWN_LABEL};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningSummary {
    pub original_rows: usize,
    pub after_missing: usize,
    /// Median used for each imputed numeric column
    pub imputed: Vec<(String, f64)>,
    pub seasons_filled: usize,
    /// Rows removed by each column's outlier rule, in application order
    pub outliers_removed: Vec<(String, usize)>,
    pub cleaned_rows: usize,
}

/// Keeps rows where every `critical` column has a value.
pub fn drop_incomplete(records: &[CropRecord], critical: &[Field]) -> Vec<CropRecord> {
    records
        .iter()
        .filter(|r| critical.iter().all(|f| r.has_value(*f)))
        .cloned()
        .collect()
}

/// Fills optional numeric columns with their median and a missing season
/// with `"Unknown"`. Only columns the table actually carries are touched.
/// Returns the medians used and the number of seasons filled.
pub fn impute_missing(records: &mut [CropRecord], table: &CropTable) -> (Vec<(Field, f64)>, usize) {
    let mut medians = Vec::new();
    for &field in IMPUTED_COLUMNS {
        if !table.has_field(field) {
            continue;
        }
        let present: Vec<f64> = records.iter().filter_map(|r| r.numeric(field)).collect();
        let Some(fill) = median(&present) else {
            continue;
        };
        for record in records.iter_mut().filter(|r| r.numeric(field).is_none()) {
            record.set_numeric(field, fill);
        }
        medians.push((field, fill));
    }

    let mut seasons_filled = 0;
    if table.has_field(Field::Season) {
        for record in records.iter_mut().filter(|r| r.categorical(Field::Season).is_none()) {
            record.set_categorical(Field::Season, UNKNOWN_LABEL);
            seasons_filled += 1;
        }
    }
    (medians, seasons_filled)
}

/// Applies the IQR rule to each column in turn, each time on the rows the
/// previous columns left. A row without a value in a filtered column is
/// dropped, as is every row of a column with no values at all.
pub fn remove_outliers(
    mut records: Vec<CropRecord>,
    columns: &[Field],
) -> (Vec<CropRecord>, Vec<(Field, usize)>) {
    let mut removed = Vec::with_capacity(columns.len());
    for &field in columns {
        let before = records.len();
        let values: Vec<f64> = records.iter().filter_map(|r| r.numeric(field)).collect();
        match iqr_bounds(&values) {
            Some((lower, upper)) => {
                records.retain(|r| r.numeric(field).is_some_and(|v| v >= lower && v <= upper));
            }
            None => records.clear(),
        }
        debug!("IQR filter on {}: {} -> {} rows", field, before, records.len());
        removed.push((field, before - records.len()));
    }
    (records, removed)
}

/// Runs the full cleaning pipeline on a table.
pub fn clean_table(table: &CropTable, critical: &[Field]) -> (Vec<CropRecord>, CleaningSummary) {
    let mut records = drop_incomplete(&table.records, critical);
    let after_missing = records.len();

    let (medians, seasons_filled) = impute_missing(&mut records, table);

    let outlier_columns: Vec<Field> = OUTLIER_COLUMNS
        .iter()
        .copied()
        .filter(|f| table.has_field(*f))
        .collect();
    let (records, removed) = remove_outliers(records, &outlier_columns);

    let summary = CleaningSummary {
        original_rows: table.len(),
        after_missing,
        imputed: medians
            .into_iter()
            .map(|(f, m)| (f.column().to_string(), m))
            .collect(),
        seasons_filled,
        outliers_removed: removed
            .into_iter()
            .map(|(f, n)| (f.column().to_string(), n))
            .collect(),
        cleaned_rows: records.len(),
    };
    info!(
        "Data cleaned. Original rows: {}, after missing-value drop: {}, cleaned: {}",
        summary.original_rows, summary.after_missing, summary.cleaned_rows
    );
    (records, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ml::feature_registry::CRITICAL_COLUMNS;

    fn record(crop: &str, area: f64, rainfall: Option<f64>, yld: f64) -> CropRecord {
        CropRecord {
            crop: Some(crop.to_string()),
            state: Some("Assam".to_string()),
            area: Some(area),
            production: Some(area * 2.0),
            annual_rainfall: rainfall,
            yield_value: Some(yld),
            ..Default::default()
        }
    }

    fn table(records: Vec<CropRecord>) -> CropTable {
        CropTable::with_fields(
            &[
                Field::Crop,
                Field::State,
                Field::Season,
                Field::Area,
                Field::Production,
                Field::AnnualRainfall,
                Field::Yield,
            ],
            records,
        )
    }

    #[test]
    fn test_rows_missing_critical_columns_are_dropped() {
        let mut missing_state = record("Rice", 1.0, None, 1.0);
        missing_state.state = None;
        let records = vec![record("Rice", 1.0, None, 1.0), missing_state];

        let kept = drop_incomplete(&records, CRITICAL_COLUMNS);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_impute_uses_median_and_unknown_season() {
        let mut records = vec![
            record("Rice", 1.0, Some(100.0), 1.0),
            record("Rice", 1.0, Some(300.0), 1.0),
            record("Rice", 1.0, Some(200.0), 1.0),
            record("Rice", 1.0, None, 1.0),
        ];
        let t = table(records.clone());

        let (medians, seasons) = impute_missing(&mut records, &t);
        assert_eq!(medians, vec![(Field::AnnualRainfall, 200.0)]);
        assert_eq!(records[3].annual_rainfall, Some(200.0));
        assert_eq!(seasons, 4);
        assert!(records.iter().all(|r| r.season.as_deref() == Some(UNKNOWN_LABEL)));
    }

    #[test]
    fn test_season_untouched_when_column_absent() {
        let mut records = vec![record("Rice", 1.0, Some(1.0), 1.0)];
        let t = CropTable::with_fields(&[Field::Crop, Field::AnnualRainfall], records.clone());
        let (_, seasons) = impute_missing(&mut records, &t);
        assert_eq!(seasons, 0);
        assert_eq!(records[0].season, None);
    }

    #[test]
    fn test_outliers_removed_per_column() {
        let mut records: Vec<CropRecord> = (1..=10)
            .map(|i| record("Rice", i as f64, Some(100.0), 1.0))
            .collect();
        records.push(record("Rice", 1000.0, Some(100.0), 1.0));

        let (cleaned, removed) = remove_outliers(records, &[Field::Area]);
        assert_eq!(cleaned.len(), 10);
        assert_eq!(removed, vec![(Field::Area, 1)]);
    }

    #[test]
    fn test_cleaning_never_adds_rows() {
        let mut records: Vec<CropRecord> = (0..25)
            .map(|i| record("Wheat", (i * i) as f64 + 1.0, Some((i % 5) as f64), i as f64))
            .collect();
        records.push(CropRecord::default());
        let t = table(records);

        let (cleaned, summary) = clean_table(&t, CRITICAL_COLUMNS);
        assert!(summary.after_missing <= summary.original_rows);
        assert!(summary.cleaned_rows <= summary.after_missing);
        assert_eq!(cleaned.len(), summary.cleaned_rows);
    }

    #[test]
    fn test_column_without_values_drops_everything() {
        let records = vec![record("Rice", 1.0, None, 1.0), record("Rice", 2.0, None, 1.0)];
        let (cleaned, _) = remove_outliers(records, &[Field::AnnualRainfall]);
        assert!(cleaned.is_empty());
    }
}
