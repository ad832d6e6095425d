use super::feature_registry::Field;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Cell values read as missing, as pandas does by default.
pub const MISSING_TOKENS: &[&str] = &[
    "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "<NA>", "#N/A",
];

fn is_missing_token(value: &str) -> bool {
    MISSING_TOKENS.contains(&value)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Cell {
    Number(f64),
    Text(String),
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Cell>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Cell::Number(v)) => Ok(Some(v)),
        Some(Cell::Text(text)) => {
            let text = text.trim();
            if text.is_empty() || is_missing_token(text) {
                return Ok(None);
            }
            text.parse()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("invalid number '{}'", text)))
        }
    }
}

fn lenient_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    match lenient_number(deserializer)? {
        None => Ok(None),
        Some(v) if v.is_nan() => Ok(None),
        Some(v) if v.fract() == 0.0 && (i32::MIN as f64..=i32::MAX as f64).contains(&v) => {
            Ok(Some(v as i32))
        }
        Some(v) => Err(de::Error::custom(format!("invalid year {}", v))),
    }
}

fn lenient_label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let label = Option::<String>::deserialize(deserializer)?;
    Ok(label.filter(|l| !is_missing_token(l.trim())))
}

/// One row of a crop-yield table. Every column is optional so that
/// incomplete rows can be loaded and cleaned afterwards. Blank cells and
/// [`MISSING_TOKENS`] load as missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CropRecord {
    #[serde(rename = "Crop", default, deserialize_with = "lenient_label")]
    pub crop: Option<String>,
    #[serde(rename = "Crop_Year", default, deserialize_with = "lenient_year")]
    pub crop_year: Option<i32>,
    #[serde(rename = "Season", default, deserialize_with = "lenient_label")]
    pub season: Option<String>,
    #[serde(rename = "State", default, deserialize_with = "lenient_label")]
    pub state: Option<String>,
    #[serde(rename = "Area", default, deserialize_with = "lenient_number")]
    pub area: Option<f64>,
    #[serde(rename = "Production", default, deserialize_with = "lenient_number")]
    pub production: Option<f64>,
    #[serde(rename = "Annual_Rainfall", default, deserialize_with = "lenient_number")]
    pub annual_rainfall: Option<f64>,
    #[serde(rename = "Fertilizer", default, deserialize_with = "lenient_number")]
    pub fertilizer: Option<f64>,
    #[serde(rename = "Pesticide", default, deserialize_with = "lenient_number")]
    pub pesticide: Option<f64>,
    #[serde(rename = "Yield", default, deserialize_with = "lenient_number")]
    pub yield_value: Option<f64>,
    /// Every cell of the source row, in the table's column order, including
    /// columns the pipeline does not use. Empty for rows built in code.
    #[serde(skip)]
    pub raw: Vec<String>,
}

/// Read access to the raw values a feature vector is built from.
pub trait FeatureSource {
    fn categorical(&self, field: Field) -> Option<&str>;
    fn numeric(&self, field: Field) -> Option<f64>;
}

impl CropRecord {
    pub fn set_numeric(&mut self, field: Field, value: f64) {
        let slot = match field {
            Field::Area => &mut self.area,
            Field::Production => &mut self.production,
            Field::AnnualRainfall => &mut self.annual_rainfall,
            Field::Fertilizer => &mut self.fertilizer,
            Field::Pesticide => &mut self.pesticide,
            Field::Yield => &mut self.yield_value,
            Field::Crop | Field::State | Field::Season => return,
        };
        *slot = Some(value);
    }

    pub fn set_categorical(&mut self, field: Field, value: impl Into<String>) {
        let slot = match field {
            Field::Crop => &mut self.crop,
            Field::State => &mut self.state,
            Field::Season => &mut self.season,
            _ => return,
        };
        *slot = Some(value.into());
    }

    /// True when the column holds a usable value (blank labels count as missing).
    pub fn has_value(&self, field: Field) -> bool {
        if field.is_categorical() {
            self.categorical(field).is_some()
        } else {
            self.numeric(field).is_some()
        }
    }
}

impl FeatureSource for CropRecord {
    fn categorical(&self, field: Field) -> Option<&str> {
        let value = match field {
            Field::Crop => self.crop.as_deref(),
            Field::State => self.state.as_deref(),
            Field::Season => self.season.as_deref(),
            _ => None,
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    fn numeric(&self, field: Field) -> Option<f64> {
        let value = match field {
            Field::Area => self.area,
            Field::Production => self.production,
            Field::AnnualRainfall => self.annual_rainfall,
            Field::Fertilizer => self.fertilizer,
            Field::Pesticide => self.pesticide,
            Field::Yield => self.yield_value,
            Field::Crop | Field::State | Field::Season => None,
        };
        value.filter(|v| v.is_finite())
    }
}

/// Rows plus the header they were read with. The header decides which
/// optional columns (e.g. Season) the table carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CropTable {
    pub columns: Vec<String>,
    pub records: Vec<CropRecord>,
}

impl CropTable {
    pub fn new(columns: Vec<String>, records: Vec<CropRecord>) -> Self {
        Self { columns, records }
    }

    /// Builds a table whose header lists exactly `fields`.
    pub fn with_fields(fields: &[Field], records: Vec<CropRecord>) -> Self {
        Self {
            columns: fields.iter().map(|f| f.column().to_string()).collect(),
            records,
        }
    }

    pub fn has_field(&self, field: Field) -> bool {
        self.columns.iter().any(|c| c == field.column())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_labels_are_missing() {
        let record = CropRecord {
            crop: Some("   ".to_string()),
            state: Some(" Assam ".to_string()),
            ..Default::default()
        };
        assert_eq!(record.categorical(Field::Crop), None);
        assert_eq!(record.categorical(Field::State), Some("Assam"));
        assert!(!record.has_value(Field::Crop));
    }

    #[test]
    fn test_non_finite_numbers_are_missing() {
        let record = CropRecord {
            area: Some(f64::NAN),
            production: Some(12.0),
            ..Default::default()
        };
        assert_eq!(record.numeric(Field::Area), None);
        assert_eq!(record.numeric(Field::Production), Some(12.0));
    }

    #[test]
    fn test_setters_ignore_mismatched_kinds() {
        let mut record = CropRecord::default();
        record.set_numeric(Field::Crop, 1.0);
        record.set_categorical(Field::Area, "x");
        assert_eq!(record, CropRecord::default());

        record.set_numeric(Field::Fertilizer, 3.5);
        record.set_categorical(Field::Season, "Unknown");
        assert_eq!(record.fertilizer, Some(3.5));
        assert_eq!(record.season.as_deref(), Some("Unknown"));
    }

    #[test]
    fn test_missing_tokens_read_as_missing() {
        let record: CropRecord = serde_json::from_str(
            r#"{"Crop": "NA", "State": "Assam", "Area": "NaN", "Production": "null",
                "Fertilizer": " 12.5 ", "Pesticide": 3, "Crop_Year": "1999", "Yield": ""}"#,
        )
        .unwrap();
        assert_eq!(record.crop, None);
        assert_eq!(record.state.as_deref(), Some("Assam"));
        assert_eq!(record.area, None);
        assert_eq!(record.production, None);
        assert_eq!(record.fertilizer, Some(12.5));
        assert_eq!(record.pesticide, Some(3.0));
        assert_eq!(record.crop_year, Some(1999));
        assert_eq!(record.yield_value, None);

        let bad = serde_json::from_str::<CropRecord>(r#"{"Area": "lots"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_table_header_drives_field_presence() {
        let table = CropTable::with_fields(&[Field::Crop, Field::Area], vec![]);
        assert!(table.has_field(Field::Crop));
        assert!(!table.has_field(Field::Season));
        assert!(table.is_empty());
    }
}
