//! On-disk model and recommender bundles: one JSON document per bundle.

use crate::application::ml::bundle::{BUNDLE_FORMAT_VERSION, ModelBundle, RecommenderBundle};
use crate::domain::errors::BundleError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::info;

/// Read before the full document so an artifact from another format version
/// is reported as such rather than as corrupt.
#[derive(Deserialize)]
struct Header {
    format_version: u32,
}

/// Writes `bundle` to `path`, creating parent directories. The file is
/// written next to the target and renamed into place.
pub fn save_bundle(bundle: &ModelBundle, path: &Path) -> Result<(), BundleError> {
    write_json(bundle, path)?;
    info!(
        "Saved {} bundle ({} features) to {:?}",
        bundle.model_kind(),
        bundle.feature_names.len(),
        path
    );
    Ok(())
}

/// Loads and validates a bundle. Anything the serving code could not use
/// is rejected here rather than at prediction time.
pub fn load_bundle(path: &Path) -> Result<ModelBundle, BundleError> {
    let bundle: ModelBundle = read_json(path)?;
    bundle.feature_layout()?;

    info!(
        "Loaded {} bundle trained at {} from {:?}",
        bundle.model_kind(),
        bundle.trained_at,
        path
    );
    Ok(bundle)
}

pub fn save_recommender(bundle: &RecommenderBundle, path: &Path) -> Result<(), BundleError> {
    write_json(bundle, path)?;
    info!(
        "Saved {} recommender ({} classes) to {:?}",
        bundle.target,
        bundle.classes.len(),
        path
    );
    Ok(())
}

pub fn load_recommender(path: &Path) -> Result<RecommenderBundle, BundleError> {
    let bundle: RecommenderBundle = read_json(path)?;
    bundle.feature_layout()?;

    info!(
        "Loaded {} recommender trained at {} from {:?}",
        bundle.target, bundle.trained_at, path
    );
    Ok(bundle)
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), BundleError> {
    let io_err = |source: std::io::Error| BundleError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let content = serde_json::to_vec(value).map_err(BundleError::Serialize)?;
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content).map_err(io_err)?;
    fs::rename(&temp_path, path).map_err(io_err)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, BundleError> {
    let content = fs::read(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => BundleError::NotFound {
            path: path.to_path_buf(),
        },
        _ => BundleError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let corrupt = |source: serde_json::Error| BundleError::Corrupt {
        path: path.to_path_buf(),
        source,
    };

    let header: Header = serde_json::from_slice(&content).map_err(corrupt)?;
    if header.format_version != BUNDLE_FORMAT_VERSION {
        return Err(BundleError::UnsupportedVersion {
            found: header.format_version,
            expected: BUNDLE_FORMAT_VERSION,
        });
    }

    serde_json::from_slice(&content).map_err(corrupt)
}
