//! Fitted model artifacts.
//!
//! The training pipeline exports its fitted scaler and regression model as
//! JSON documents carrying the learned parameters:
//!
//! ```json
//! {"kind": "standard", "feature_names_in": ["avg_weekly_income", "..."],
//!  "mean": [1650.0, "..."], "scale": [210.0, "..."]}
//!
//! {"coefficients": [0.012, "..."], "intercept": 3.4}
//! ```
//!
//! Both operate on 2-D input of shape `(rows, n_features)`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{LoadError, ResourceKey};

/// Input width did not match what an artifact was fitted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("expected {expected} features per row, got {actual}")]
pub struct ShapeError {
    /// Width the artifact was fitted on.
    pub expected: usize,
    /// Width supplied.
    pub actual: usize,
}

const fn default_feature_range() -> (f64, f64) {
    (0.0, 1.0)
}

/// A fitted feature scaler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalerArtifact {
    /// Standardization: `(x - mean) / scale`.
    Standard {
        /// Feature names seen during fit, in training order.
        #[serde(default)]
        feature_names_in: Option<Vec<String>>,
        /// Per-feature mean.
        mean: Vec<f64>,
        /// Per-feature standard deviation.
        scale: Vec<f64>,
    },
    /// Min-max normalization onto `feature_range`.
    MinMax {
        /// Feature names seen during fit, in training order.
        #[serde(default)]
        feature_names_in: Option<Vec<String>>,
        /// Per-feature minimum seen during fit.
        data_min: Vec<f64>,
        /// Per-feature `max - min` seen during fit.
        data_range: Vec<f64>,
        /// Target range.
        #[serde(default = "default_feature_range")]
        feature_range: (f64, f64),
    },
}

impl ScalerArtifact {
    /// Reads and validates the scaler at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the file is unreadable, not valid JSON, or
    /// its parameter arrays disagree in width.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
        let scaler = Self::from_json(&text)?;
        log::info!(
            "Loaded {} scaler ({} features) from {}",
            scaler.kind(),
            scaler.n_features(),
            path.display()
        );
        Ok(scaler)
    }

    /// Parses and validates a scaler document.
    ///
    /// # Errors
    ///
    /// See [`ScalerArtifact::load`].
    pub fn from_json(text: &str) -> Result<Self, LoadError> {
        let scaler: Self = serde_json::from_str(text)?;
        scaler.validate()?;
        Ok(scaler)
    }

    fn validate(&self) -> Result<(), LoadError> {
        let (first, second) = match self {
            Self::Standard { mean, scale, .. } => (mean.len(), scale.len()),
            Self::MinMax {
                data_min,
                data_range,
                ..
            } => (data_min.len(), data_range.len()),
        };
        if first != second {
            return Err(LoadError::malformed(
                ResourceKey::Scaler,
                format!("parameter arrays differ in width ({first} vs {second})"),
            ));
        }
        if first == 0 {
            return Err(LoadError::malformed(ResourceKey::Scaler, "no features"));
        }
        if let Some(names) = self.feature_names() {
            if names.len() != first {
                return Err(LoadError::malformed(
                    ResourceKey::Scaler,
                    format!("{} feature names for {first} fitted features", names.len()),
                ));
            }
        }
        Ok(())
    }

    /// Short name of the scaler type.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Standard { .. } => "standard",
            Self::MinMax { .. } => "min_max",
        }
    }

    /// Feature names recorded at fit time, if the pipeline kept them.
    #[must_use]
    pub fn feature_names(&self) -> Option<&[String]> {
        match self {
            Self::Standard {
                feature_names_in, ..
            }
            | Self::MinMax {
                feature_names_in, ..
            } => feature_names_in.as_deref(),
        }
    }

    /// Number of features the scaler was fitted on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        match self {
            Self::Standard { mean, .. } => mean.len(),
            Self::MinMax { data_min, .. } => data_min.len(),
        }
    }

    /// Scales every row. Zero scale or range entries act as `1.0`.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError`] if any row has the wrong width.
    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ShapeError> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }

    fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, ShapeError> {
        let expected = self.n_features();
        if row.len() != expected {
            return Err(ShapeError {
                expected,
                actual: row.len(),
            });
        }

        Ok(match self {
            Self::Standard { mean, scale, .. } => row
                .iter()
                .zip(mean.iter().zip(scale))
                .map(|(x, (m, s))| (x - m) / non_zero(*s))
                .collect(),
            Self::MinMax {
                data_min,
                data_range,
                feature_range: (low, high),
                ..
            } => row
                .iter()
                .zip(data_min.iter().zip(data_range))
                .map(|(x, (min, range))| ((x - min) / non_zero(*range)).mul_add(high - low, *low))
                .collect(),
        })
    }
}

#[allow(clippy::float_cmp)]
fn non_zero(value: f64) -> f64 {
    if value == 0.0 { 1.0 } else { value }
}

/// A fitted linear regression model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    /// One coefficient per scaled feature.
    pub coefficients: Vec<f64>,
    /// Intercept term.
    pub intercept: f64,
}

impl LinearModel {
    /// Reads and validates the model at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the file is unreadable, not valid JSON, or
    /// has no coefficients.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
        let model = Self::from_json(&text)?;
        log::info!(
            "Loaded linear model ({} coefficients) from {}",
            model.n_features(),
            path.display()
        );
        Ok(model)
    }

    /// Parses and validates a model document.
    ///
    /// # Errors
    ///
    /// See [`LinearModel::load`].
    pub fn from_json(text: &str) -> Result<Self, LoadError> {
        let model: Self = serde_json::from_str(text)?;
        if model.coefficients.is_empty() {
            return Err(LoadError::malformed(ResourceKey::Model, "no coefficients"));
        }
        Ok(model)
    }

    /// Number of input features.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    /// Predicts one value per row.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError`] if any row has the wrong width.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ShapeError> {
        rows.iter()
            .map(|row| {
                if row.len() != self.coefficients.len() {
                    return Err(ShapeError {
                        expected: self.coefficients.len(),
                        actual: row.len(),
                    });
                }
                Ok(row
                    .iter()
                    .zip(&self.coefficients)
                    .fold(self.intercept, |acc, (x, c)| x.mul_add(*c, acc)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_scaler_transforms() {
        let scaler = ScalerArtifact::from_json(
            r#"{"kind": "standard", "feature_names_in": ["a", "b"], "mean": [10.0, 0.0], "scale": [2.0, 0.0]}"#,
        )
        .unwrap();
        assert_eq!(scaler.feature_names().unwrap(), ["a", "b"]);
        let scaled = scaler.transform(&[vec![14.0, 3.0]]).unwrap();
        assert_eq!(scaled, vec![vec![2.0, 3.0]]);
    }

    #[test]
    fn min_max_scaler_transforms() {
        let scaler = ScalerArtifact::from_json(
            r#"{"kind": "min_max", "data_min": [0.0, 5.0], "data_range": [10.0, 5.0], "feature_range": [-1.0, 1.0]}"#,
        )
        .unwrap();
        assert!(scaler.feature_names().is_none());
        let scaled = scaler.transform(&[vec![5.0, 10.0]]).unwrap();
        assert!((scaled[0][0] - 0.0).abs() < 1e-12);
        assert!((scaled[0][1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn scaler_rejects_wrong_width() {
        let scaler =
            ScalerArtifact::from_json(r#"{"kind": "standard", "mean": [0.0], "scale": [1.0]}"#)
                .unwrap();
        assert_eq!(
            scaler.transform(&[vec![1.0, 2.0]]).unwrap_err(),
            ShapeError {
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn inconsistent_scaler_is_malformed() {
        let err = ScalerArtifact::from_json(
            r#"{"kind": "standard", "feature_names_in": ["a"], "mean": [0.0, 1.0], "scale": [1.0, 1.0]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::Malformed { resource: ResourceKey::Scaler, .. }));

        let err = ScalerArtifact::from_json(r#"{"kind": "standard", "mean": [0.0], "scale": []}"#)
            .unwrap_err();
        assert!(matches!(err, LoadError::Malformed { .. }));
    }

    #[test]
    fn unknown_scaler_kind_is_json_error() {
        let err = ScalerArtifact::from_json(r#"{"kind": "robust", "center": [0.0]}"#).unwrap_err();
        assert!(matches!(err, LoadError::Json(_)));
    }

    #[test]
    fn linear_model_predicts() {
        let model =
            LinearModel::from_json(r#"{"coefficients": [0.5, -2.0], "intercept": 1.0}"#).unwrap();
        let predictions = model.predict(&[vec![4.0, 1.0], vec![0.0, 0.0]]).unwrap();
        assert_eq!(predictions, vec![1.0, 1.0]);
        assert!(model.predict(&[vec![1.0]]).is_err());
    }

    #[test]
    fn empty_model_is_malformed() {
        let err = LinearModel::from_json(r#"{"coefficients": [], "intercept": 1.0}"#).unwrap_err();
        assert!(matches!(err, LoadError::Malformed { resource: ResourceKey::Model, .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = LinearModel::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
