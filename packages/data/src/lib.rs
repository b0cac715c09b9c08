#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Data sources for the housing stress engine.
//!
//! Every expensive input is materialized through the [`cache::ResourceCache`]
//! at most once per process:
//!
//! - the tabular area dataset ([`dataset::AreaTable`], CSV),
//! - the area boundaries ([`geography::GeographyIndex`], `GeoJSON`),
//! - the fitted scaler ([`artifacts::ScalerArtifact`], JSON),
//! - the fitted regression model ([`artifacts::LinearModel`], JSON).
//!
//! File locations are resolved by [`paths`].

pub mod artifacts;
pub mod cache;
pub mod dataset;
pub mod geography;
pub mod paths;

use std::path::PathBuf;

use strum_macros::{AsRefStr, Display};
use thiserror::Error;

/// Identifies one cached resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKey {
    /// Tabular area dataset.
    Areas,
    /// Area boundary polygons.
    Geography,
    /// Fitted regression model.
    Model,
    /// Fitted feature scaler.
    Scaler,
}

impl ResourceKey {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Areas, Self::Geography, Self::Model, Self::Scaler]
    }
}

/// Errors raised while materializing a cached resource.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The source file could not be read.
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        /// File that failed to open or read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// CSV decoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `GeoJSON` decoding failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The data layout file is not valid TOML for a layout.
    #[error("Invalid data layout {}: {source}", path.display())]
    Layout {
        /// Layout file that failed to parse.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// A required column is absent from the dataset header.
    #[error("Missing column '{column}' in {resource}")]
    MissingColumn {
        /// Resource being loaded.
        resource: ResourceKey,
        /// Name of the missing column.
        column: String,
    },

    /// Two dataset rows share an area identifier.
    #[error("Duplicate area identifier '{area_id}'")]
    DuplicateArea {
        /// The repeated identifier.
        area_id: String,
    },

    /// The resource parsed but its content is inconsistent.
    #[error("Malformed {resource}: {message}")]
    Malformed {
        /// Resource being loaded.
        resource: ResourceKey,
        /// Description of the problem.
        message: String,
    },
}

impl LoadError {
    /// Wraps an I/O error with the path that produced it.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds a [`LoadError::Malformed`].
    #[must_use]
    pub fn malformed(resource: ResourceKey, message: impl Into<String>) -> Self {
        Self::Malformed {
            resource,
            message: message.into(),
        }
    }
}
