#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Area, scenario, feature schema, and prediction types.
//!
//! These types flow through every stage of a scenario resolution: an
//! [`AreaRecord`] is loaded from the tabular dataset, a
//! [`ScenarioAdjustment`] is applied to its baseline [`FeatureRecord`], the
//! result is projected onto a [`ModelSchema`] to produce a
//! [`FeatureVector`], and scoring yields a [`Prediction`] (or a
//! [`PredictionOutcome`] when the result is handed to a presentation layer).

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Features the scenario controls operate on by name.
///
/// Any other dataset column is carried as an "extra" feature in
/// [`FeatureRecord`] and is only ever read during schema projection.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum KnownFeature {
    /// Average weekly household income.
    AvgWeeklyIncome,
    /// Average weekly rent.
    AvgWeeklyRent,
    /// Average weekly mortgage repayment.
    AvgWeeklyMortgage,
    /// Unemployment rate in percent.
    UnemploymentRate,
    /// Number of residents employed in mining.
    TotalMining,
    /// Share of the workforce employed in mining.
    MiningConcentrationRatio,
    /// Average number of persons per household.
    AvgHouseholdSize,
    /// Weekly income minus weekly rent.
    IncomeRentGap,
}

impl KnownFeature {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::AvgWeeklyIncome,
            Self::AvgWeeklyRent,
            Self::AvgWeeklyMortgage,
            Self::UnemploymentRate,
            Self::TotalMining,
            Self::MiningConcentrationRatio,
            Self::AvgHouseholdSize,
            Self::IncomeRentGap,
        ]
    }
}

/// A complete set of named feature values for one area.
///
/// Values for [`KnownFeature`] names are stored in a typed map so the
/// scenario adjustments can address them without string lookups; every
/// other column lands in the residual `extra` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    known: BTreeMap<KnownFeature, f64>,
    extra: BTreeMap<String, f64>,
}

impl FeatureRecord {
    /// Creates an empty record.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            known: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Inserts a value by column name, routing known names to the typed map.
    ///
    /// Returns the previous value, if any.
    pub fn insert(&mut self, name: &str, value: f64) -> Option<f64> {
        match KnownFeature::from_str(name) {
            Ok(feature) => self.known.insert(feature, value),
            Err(_) => self.extra.insert(name.to_string(), value),
        }
    }

    /// Sets a known feature value, returning the previous value.
    pub fn set(&mut self, feature: KnownFeature, value: f64) -> Option<f64> {
        self.known.insert(feature, value)
    }

    /// Returns the value of a known feature.
    #[must_use]
    pub fn known(&self, feature: KnownFeature) -> Option<f64> {
        self.known.get(&feature).copied()
    }

    /// Looks up a value by column name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        KnownFeature::from_str(name).map_or_else(
            |_| self.extra.get(name).copied(),
            |feature| self.known(feature),
        )
    }

    /// Whether the record holds a value for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of features in the record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.known.len() + self.extra.len()
    }

    /// Whether the record holds no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.known.is_empty() && self.extra.is_empty()
    }

    /// Iterates `(name, value)` pairs, known features first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.known
            .iter()
            .map(|(feature, value)| (feature.as_ref(), *value))
            .chain(self.extra.iter().map(|(name, value)| (name.as_str(), *value)))
    }
}

impl<S: AsRef<str>> FromIterator<(S, f64)> for FeatureRecord {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (name, value) in iter {
            record.insert(name.as_ref(), value);
        }
        record
    }
}

/// Geographic centroid of an area (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
}

/// One geographic area as loaded from the tabular dataset.
///
/// Immutable after load; reconciliation always works on a copy of
/// [`AreaRecord::baseline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaRecord {
    /// Unique area code (e.g. an SA2 code).
    pub area_id: String,
    /// Human-readable area name.
    pub name: String,
    /// Centroid, when the dataset carries coordinates.
    pub centroid: Option<Centroid>,
    /// Baseline value for every feature column in the dataset.
    pub baseline: FeatureRecord,
    /// Observed housing stress index, when recorded.
    pub housing_stress_index: Option<f64>,
}

/// User-supplied deltas for one scenario resolution.
///
/// All fields default to zero, which is an exact no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioAdjustment {
    /// Added to weekly income.
    pub income_adj: f64,
    /// Added to weekly rent.
    pub rent_adj: f64,
    /// Added to weekly mortgage repayment.
    pub mortgage_adj: f64,
    /// Added to the unemployment rate (percentage points).
    pub unemployment_adj: f64,
    /// Percentage change applied to the mining workforce.
    pub mining_pct_adj: f64,
}

impl ScenarioAdjustment {
    /// The zero adjustment.
    pub const ZERO: Self = Self {
        income_adj: 0.0,
        rent_adj: 0.0,
        mortgage_adj: 0.0,
        unemployment_adj: 0.0,
        mining_pct_adj: 0.0,
    };

    /// Whether every delta is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// The first delta that is `NaN` or infinite, with its field name.
    #[must_use]
    pub fn first_non_finite(&self) -> Option<(&'static str, f64)> {
        [
            ("income_adj", self.income_adj),
            ("rent_adj", self.rent_adj),
            ("mortgage_adj", self.mortgage_adj),
            ("unemployment_adj", self.unemployment_adj),
            ("mining_pct_adj", self.mining_pct_adj),
        ]
        .into_iter()
        .find(|(_, value)| !value.is_finite())
    }

    /// Multiplier applied to mining figures (`1.0` for a zero delta).
    #[must_use]
    pub fn mining_multiplier(&self) -> f64 {
        1.0 + self.mining_pct_adj / 100.0
    }
}

/// Where a [`ModelSchema`] was derived from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SchemaSource {
    /// Feature names recorded by the fitted scaler artifact.
    Scaler,
    /// Dataset columns minus identifier, descriptive, and target columns.
    Dataset,
}

/// The ordered feature names the trained model expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSchema {
    names: Vec<String>,
    source: SchemaSource,
}

impl ModelSchema {
    /// Creates a schema from an ordered name list.
    #[must_use]
    pub const fn new(names: Vec<String>, source: SchemaSource) -> Self {
        Self { names, source }
    }

    /// Ordered feature names.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Where the names came from.
    #[must_use]
    pub const fn source(&self) -> SchemaSource {
        self.source
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the schema has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Index of `name` in the schema.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Error returned when a [`FeatureVector`] would not match its schema width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorLengthError {
    /// Schema width.
    pub expected: usize,
    /// Number of values supplied.
    pub actual: usize,
}

impl std::fmt::Display for VectorLengthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "feature vector has {} values but the schema has {} features",
            self.actual, self.expected
        )
    }
}

impl std::error::Error for VectorLengthError {}

/// Numeric feature values ordered exactly as their [`ModelSchema`].
///
/// Index `i` always holds the value for `schema.names()[i]`; a vector of
/// any other width cannot be constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    schema: Arc<ModelSchema>,
    values: Vec<f64>,
}

impl FeatureVector {
    /// Pairs `values` with `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`VectorLengthError`] if the lengths differ.
    pub fn try_new(schema: Arc<ModelSchema>, values: Vec<f64>) -> Result<Self, VectorLengthError> {
        if values.len() != schema.len() {
            return Err(VectorLengthError {
                expected: schema.len(),
                actual: values.len(),
            });
        }
        Ok(Self { schema, values })
    }

    /// Values in schema order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The schema this vector was projected onto.
    #[must_use]
    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the vector is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value for a named feature.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.schema.position(name).map(|i| self.values[i])
    }

    /// Iterates `(name, value)` pairs in schema order.
    pub fn named_values(&self) -> impl Iterator<Item = (&str, f64)> {
        self.schema
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

/// Inference mode held in the interactive session.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InferenceMode {
    /// Score through the remote inference service.
    #[default]
    Remote,
    /// Score with the cached local model artifacts.
    Local,
}

/// Which path actually produced a prediction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InferencePath {
    /// Remote inference service.
    Remote,
    /// In-process model and scaler.
    Local,
}

/// A successful scenario resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    /// Predicted housing stress index.
    pub value: f64,
    /// Path that produced the value.
    pub path: InferencePath,
    /// Number of features scored.
    pub feature_count: usize,
}

/// Category of a failed resolution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// A cached resource could not be loaded.
    Load,
    /// No feature schema could be derived.
    SchemaUnavailable,
    /// The scaler and dataset schemas disagree.
    SchemaDivergent,
    /// The requested area does not exist.
    UnknownArea,
    /// The working record lacks a schema feature.
    FeatureMissing,
    /// An adjustment is not a finite number, or produced one.
    InvalidAdjustment,
    /// Local scoring failed after the remote path was unavailable.
    LocalInference,
}

/// Result of a resolution attempt in presentation form.
///
/// Serialises with a `status` tag so that a success mirrors the remote
/// service's response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictionOutcome {
    /// A prediction was produced.
    Success {
        /// Predicted housing stress index.
        predicted_housing_stress_index: f64,
        /// Path that produced the value.
        path: InferencePath,
        /// Number of features scored.
        feature_count: usize,
    },
    /// The resolution failed.
    Error {
        /// Error category.
        kind: ErrorKind,
        /// Human-readable cause.
        message: String,
    },
}

impl PredictionOutcome {
    /// Builds a failed outcome.
    #[must_use]
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// The predicted value, if successful.
    #[must_use]
    pub const fn value(&self) -> Option<f64> {
        match self {
            Self::Success {
                predicted_housing_stress_index,
                ..
            } => Some(*predicted_housing_stress_index),
            Self::Error { .. } => None,
        }
    }

    /// The inference path, if successful.
    #[must_use]
    pub const fn path(&self) -> Option<InferencePath> {
        match self {
            Self::Success { path, .. } => Some(*path),
            Self::Error { .. } => None,
        }
    }

    /// The error kind, if failed.
    #[must_use]
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Error { kind, .. } => Some(*kind),
        }
    }
}

impl From<Prediction> for PredictionOutcome {
    fn from(prediction: Prediction) -> Self {
        Self::Success {
            predicted_housing_stress_index: prediction.value,
            path: prediction.path,
            feature_count: prediction.feature_count,
        }
    }
}
