#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the engine's input data.
//!
//! All paths live under the project root's `data/` directory unless
//! `HOUSING_STRESS_DATA_DIR` points somewhere else:
//!
//! ```text
//! data/
//!   areas.csv
//!   layout.toml        (optional column roles)
//!   boundaries.geojson
//!   models/
//!     scaler.json
//!     model.json
//! ```

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "HOUSING_STRESS_DATA_DIR";

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Returns the data directory, honoring [`ENV_DATA_DIR`].
#[must_use]
pub fn data_dir() -> PathBuf {
    std::env::var(ENV_DATA_DIR)
        .ok()
        .filter(|dir| !dir.is_empty())
        .map_or_else(|| project_root().join("data"), PathBuf::from)
}

/// Locations of every file the resource cache reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    /// Tabular area dataset (CSV).
    pub areas: PathBuf,
    /// Optional column layout for the dataset (TOML).
    pub layout: PathBuf,
    /// Area boundaries (`GeoJSON` `FeatureCollection`).
    pub boundaries: PathBuf,
    /// Fitted scaler artifact (JSON).
    pub scaler: PathBuf,
    /// Fitted regression model artifact (JSON).
    pub model: PathBuf,
}

impl DataPaths {
    /// Lays out the standard file names under `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        let models = dir.join("models");
        Self {
            areas: dir.join("areas.csv"),
            layout: dir.join("layout.toml"),
            boundaries: dir.join("boundaries.geojson"),
            scaler: models.join("scaler.json"),
            model: models.join("model.json"),
        }
    }

    /// Lays out the standard file names under [`data_dir`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::in_dir(&data_dir())
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::from_env()
    }
}
