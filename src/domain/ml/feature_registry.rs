use std::fmt;
use std::str::FromStr;

/// Label used to fill a missing season during training.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Columns of the crop-yield table the pipeline knows how to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Crop,
    State,
    Season,
    Area,
    Production,
    AnnualRainfall,
    Fertilizer,
    Pesticide,
    Yield,
}

/// Rows missing any of these are dropped before training.
pub const CRITICAL_COLUMNS: &[Field] = &[
    Field::Crop,
    Field::State,
    Field::Area,
    Field::Production,
    Field::Yield,
];

/// Optional numeric columns filled with their median.
pub const IMPUTED_COLUMNS: &[Field] = &[Field::AnnualRainfall, Field::Fertilizer, Field::Pesticide];

/// Columns filtered with the IQR rule, in application order.
pub const OUTLIER_COLUMNS: &[Field] = &[
    Field::Area,
    Field::Production,
    Field::AnnualRainfall,
    Field::Fertilizer,
    Field::Pesticide,
    Field::Yield,
];

/// Ordered feature list used when the caller does not pick one.
/// Season is appended last when the table carries it.
/// Changing this order is a breaking change for saved bundles.
pub const BASE_FEATURES: &[Field] = &[
    Field::Crop,
    Field::State,
    Field::Area,
    Field::Production,
    Field::AnnualRainfall,
    Field::Fertilizer,
    Field::Pesticide,
];

const ALL_FIELDS: &[Field] = &[
    Field::Crop,
    Field::State,
    Field::Season,
    Field::Area,
    Field::Production,
    Field::AnnualRainfall,
    Field::Fertilizer,
    Field::Pesticide,
    Field::Yield,
];

impl Field {
    /// CSV header of the column.
    pub fn column(&self) -> &'static str {
        match self {
            Field::Crop => "Crop",
            Field::State => "State",
            Field::Season => "Season",
            Field::Area => "Area",
            Field::Production => "Production",
            Field::AnnualRainfall => "Annual_Rainfall",
            Field::Fertilizer => "Fertilizer",
            Field::Pesticide => "Pesticide",
            Field::Yield => "Yield",
        }
    }

    /// Name of the column once it is part of a feature vector.
    pub fn feature_name(&self) -> &'static str {
        match self {
            Field::Crop => "Crop_Encoded",
            Field::State => "State_Encoded",
            Field::Season => "Season_Encoded",
            other => other.column(),
        }
    }

    /// Category set the encoder keeps for this column, if it is categorical.
    pub fn category_set(&self) -> Option<&'static str> {
        match self {
            Field::Crop => Some("crop"),
            Field::State => Some("state"),
            Field::Season => Some("season"),
            _ => None,
        }
    }

    pub fn is_categorical(&self) -> bool {
        self.category_set().is_some()
    }

    pub fn from_column(name: &str) -> Option<Field> {
        ALL_FIELDS.iter().copied().find(|f| f.column() == name)
    }

    pub fn from_feature_name(name: &str) -> Option<Field> {
        ALL_FIELDS.iter().copied().find(|f| f.feature_name() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Field {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::from_column(s)
            .or_else(|| Field::from_feature_name(s))
            .or_else(|| {
                ALL_FIELDS
                    .iter()
                    .copied()
                    .find(|f| f.column().eq_ignore_ascii_case(s))
            })
            .ok_or_else(|| anyhow::anyhow!("Unknown column: {}", s))
    }
}

/// Default feature layout for a table.
pub fn default_features(has_season: bool) -> Vec<Field> {
    let mut features = BASE_FEATURES.to_vec();
    if has_season {
        features.push(Field::Season);
    }
    features
}

pub fn feature_names(fields: &[Field]) -> Vec<String> {
    fields.iter().map(|f| f.feature_name().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_feature_order() {
        let names = feature_names(&default_features(false));
        assert_eq!(
            names,
            vec![
                "Crop_Encoded",
                "State_Encoded",
                "Area",
                "Production",
                "Annual_Rainfall",
                "Fertilizer",
                "Pesticide"
            ]
        );
    }

    #[test]
    fn test_season_is_appended_last() {
        let features = default_features(true);
        assert_eq!(features.len(), BASE_FEATURES.len() + 1);
        assert_eq!(features.last(), Some(&Field::Season));
    }

    #[test]
    fn test_feature_name_lookup_roundtrip() {
        for field in ALL_FIELDS {
            assert_eq!(Field::from_feature_name(field.feature_name()), Some(*field));
            assert_eq!(Field::from_column(field.column()), Some(*field));
        }
        assert_eq!(Field::from_feature_name("Crop"), None);
    }

    #[test]
    fn test_parse_field_is_lenient() {
        assert_eq!("annual_rainfall".parse::<Field>().unwrap(), Field::AnnualRainfall);
        assert_eq!("Season_Encoded".parse::<Field>().unwrap(), Field::Season);
        assert!("Humidity".parse::<Field>().is_err());
    }
}
