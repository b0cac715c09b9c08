//! In-process scoring with the cached scaler and regression model.

use std::sync::Arc;

use housing_stress_data::artifacts::{LinearModel, ScalerArtifact, ShapeError};
use housing_stress_data::cache::ResourceCache;
use housing_stress_data::{LoadError, ResourceKey};
use housing_stress_scenario_models::FeatureVector;
use thiserror::Error;

/// Local scoring failed. With the remote path already exhausted this is
/// fatal to the request.
#[derive(Debug, Error)]
pub enum LocalInferenceError {
    /// The scaler or model could not be loaded.
    #[error("Local model artifacts unavailable: {0}")]
    ArtifactUnavailable(#[from] LoadError),

    /// The vector width does not match an artifact's input width.
    #[error("Feature vector has {actual} values but the {artifact} expects {expected}")]
    WidthMismatch {
        /// Artifact that rejected the input.
        artifact: ResourceKey,
        /// Width the artifact was fitted on.
        expected: usize,
        /// Width supplied.
        actual: usize,
    },

    /// The vector's feature names differ from the scaler's fitted names.
    #[error("Feature '{actual}' at position {position} does not match scaler feature '{expected}'")]
    FeatureOrder {
        /// First differing position.
        position: usize,
        /// Scaler's name at `position`.
        expected: String,
        /// Vector's name at `position`.
        actual: String,
    },

    /// The model produced no output row.
    #[error("Model returned no prediction")]
    EmptyPrediction,

    /// The model produced NaN or an infinity.
    #[error("Model produced a non-finite prediction ({value})")]
    NonFinite {
        /// The offending value.
        value: f64,
    },
}

impl LocalInferenceError {
    const fn width(artifact: ResourceKey, error: ShapeError) -> Self {
        Self::WidthMismatch {
            artifact,
            expected: error.expected,
            actual: error.actual,
        }
    }
}

/// Scores vectors with the artifacts held in a [`ResourceCache`].
#[derive(Debug, Clone)]
pub struct LocalPredictor {
    cache: Arc<ResourceCache>,
}

impl LocalPredictor {
    /// Creates a predictor over the shared cache.
    #[must_use]
    pub const fn new(cache: Arc<ResourceCache>) -> Self {
        Self { cache }
    }

    /// Scales `vector` and runs the model on the single resulting row.
    ///
    /// # Errors
    ///
    /// Returns [`LocalInferenceError`] if an artifact cannot be loaded or
    /// rejects the vector, or if the output is not a finite number.
    pub fn predict(&self, vector: &FeatureVector) -> Result<f64, LocalInferenceError> {
        let scaler = self.cache.scaler()?;
        let model = self.cache.model()?;
        predict_with(&scaler, &model, vector)
    }
}

/// Scores `vector` with an explicit scaler and model.
///
/// # Errors
///
/// See [`LocalPredictor::predict`].
pub fn predict_with(
    scaler: &ScalerArtifact,
    model: &LinearModel,
    vector: &FeatureVector,
) -> Result<f64, LocalInferenceError> {
    if let Some(fitted) = scaler.feature_names() {
        check_names(fitted, vector.schema().names())?;
    }

    let rows = [vector.values().to_vec()];
    let scaled = scaler
        .transform(&rows)
        .map_err(|e| LocalInferenceError::width(ResourceKey::Scaler, e))?;
    let predictions = model
        .predict(&scaled)
        .map_err(|e| LocalInferenceError::width(ResourceKey::Model, e))?;

    let value = predictions
        .first()
        .copied()
        .ok_or(LocalInferenceError::EmptyPrediction)?;
    if !value.is_finite() {
        return Err(LocalInferenceError::NonFinite { value });
    }

    log::debug!("Local model scored {} features: {value}", vector.len());
    Ok(value)
}

fn check_names(fitted: &[String], names: &[String]) -> Result<(), LocalInferenceError> {
    if fitted.len() != names.len() {
        return Err(LocalInferenceError::WidthMismatch {
            artifact: ResourceKey::Scaler,
            expected: fitted.len(),
            actual: names.len(),
        });
    }
    match fitted.iter().zip(names).position(|(a, b)| a != b) {
        Some(position) => Err(LocalInferenceError::FeatureOrder {
            position,
            expected: fitted[position].clone(),
            actual: names[position].clone(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use housing_stress_scenario_models::{ModelSchema, SchemaSource};

    use super::*;

    pub fn scaler() -> ScalerArtifact {
        ScalerArtifact::Standard {
            feature_names_in: Some(vec![
                "avg_weekly_income".to_string(),
                "avg_weekly_rent".to_string(),
            ]),
            mean: vec![1600.0, 400.0],
            scale: vec![200.0, 20.0],
        }
    }

    pub fn model() -> LinearModel {
        LinearModel {
            coefficients: vec![-2.0, 3.0],
            intercept: 10.0,
        }
    }

    pub fn artifact_cache() -> Arc<ResourceCache> {
        Arc::new(
            ResourceCache::from_env()
                .with_scaler_loader(|| Ok(scaler()))
                .with_model_loader(|| Ok(model())),
        )
    }

    fn vector_with(names: &[&str], values: Vec<f64>) -> FeatureVector {
        let schema = Arc::new(ModelSchema::new(
            names.iter().map(ToString::to_string).collect(),
            SchemaSource::Scaler,
        ));
        FeatureVector::try_new(schema, values).unwrap()
    }

    #[test]
    fn scales_then_predicts() {
        // scaled = [(1800 - 1600) / 200, (420 - 400) / 20] = [1, 1]
        let vector = vector_with(&["avg_weekly_income", "avg_weekly_rent"], vec![1800.0, 420.0]);
        let value = LocalPredictor::new(artifact_cache()).predict(&vector).unwrap();
        assert!((value - 11.0).abs() < 1e-12);
    }

    #[test]
    fn predictor_matches_direct_artifacts() {
        let vector = vector_with(&["avg_weekly_income", "avg_weekly_rent"], vec![1234.5, 377.0]);
        let cached = LocalPredictor::new(artifact_cache()).predict(&vector).unwrap();
        let direct = predict_with(&scaler(), &model(), &vector).unwrap();
        assert_eq!(cached.to_bits(), direct.to_bits());
    }

    #[test]
    fn reordered_features_are_rejected() {
        let vector = vector_with(&["avg_weekly_rent", "avg_weekly_income"], vec![420.0, 1800.0]);
        let err = predict_with(&scaler(), &model(), &vector).unwrap_err();
        assert!(matches!(
            err,
            LocalInferenceError::FeatureOrder { position: 0, ref expected, .. } if expected == "avg_weekly_income"
        ));
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let vector = vector_with(&["avg_weekly_income"], vec![1800.0]);
        let err = predict_with(&scaler(), &model(), &vector).unwrap_err();
        assert!(matches!(
            err,
            LocalInferenceError::WidthMismatch {
                artifact: ResourceKey::Scaler,
                expected: 2,
                actual: 1
            }
        ));

        let unnamed = ScalerArtifact::Standard {
            feature_names_in: None,
            mean: vec![0.0],
            scale: vec![1.0],
        };
        let err = predict_with(&unnamed, &model(), &vector).unwrap_err();
        assert!(matches!(
            err,
            LocalInferenceError::WidthMismatch {
                artifact: ResourceKey::Model,
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn non_finite_output_is_rejected() {
        let scaler = ScalerArtifact::Standard {
            feature_names_in: None,
            mean: vec![0.0],
            scale: vec![1.0],
        };
        let model = LinearModel {
            coefficients: vec![f64::MAX],
            intercept: 0.0,
        };
        let vector = vector_with(&["x"], vec![10.0]);
        assert!(matches!(
            predict_with(&scaler, &model, &vector),
            Err(LocalInferenceError::NonFinite { .. })
        ));
    }

    #[test]
    fn missing_artifacts_are_unavailable() {
        let cache = Arc::new(
            ResourceCache::from_env()
                .with_scaler_loader(|| Ok(scaler()))
                .with_model_loader(|| {
                    Err(LoadError::malformed(ResourceKey::Model, "no coefficients"))
                }),
        );
        let vector = vector_with(&["x"], vec![1.0]);
        let err = LocalPredictor::new(cache).predict(&vector);
        assert!(matches!(err, Err(LocalInferenceError::ArtifactUnavailable(_))));
    }
}
