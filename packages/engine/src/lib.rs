#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Scenario resolution engine.
//!
//! Wires the shared [`ResourceCache`] through schema resolution and
//! feature reconciliation into the remote-then-local inference resolver:
//!
//! ```text
//! area + adjustment -> FeatureReconciler -> FeatureVector
//!                   -> InferenceResolver (remote, else local) -> Prediction
//! ```
//!
//! Callers own the [`SessionState`] and pass it to every call that may
//! change the inference mode.

use std::sync::Arc;

use housing_stress_data::LoadError;
use housing_stress_data::cache::ResourceCache;
use housing_stress_data::dataset::AreaTable;
use housing_stress_inference::{
    HttpRemote, InferenceResolver, LocalInferenceError, RemoteService, SessionState,
};
use housing_stress_scenario::{FeatureReconciler, ReconcileError, SchemaError, SchemaResolver};
use housing_stress_scenario_models::{
    ErrorKind, FeatureRecord, ModelSchema, Prediction, PredictionOutcome, ScenarioAdjustment,
    VectorLengthError,
};
use thiserror::Error;

/// Every error a resolution can surface to its caller.
///
/// Remote failures never appear here; they are absorbed by the local
/// fallback.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A cached resource could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// No usable feature schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The requested area does not exist.
    #[error("Unknown area '{area}'")]
    UnknownArea {
        /// The identifier or name that was requested.
        area: String,
    },

    /// The working record could not satisfy the schema.
    #[error("Missing feature(s) in working record: {}", .missing.join(", "))]
    FeatureMissing {
        /// Missing feature names, in schema order.
        missing: Vec<String>,
    },

    /// An adjustment delta is `NaN` or infinite.
    #[error("Adjustment '{field}' must be a finite number, got {value}")]
    InvalidAdjustment {
        /// Adjustment field name.
        field: String,
        /// The rejected delta.
        value: f64,
    },

    /// The adjusted record holds a `NaN` or infinite feature value.
    #[error("Feature '{feature}' is not a finite number ({value})")]
    NonFinite {
        /// Feature name.
        feature: String,
        /// The offending value.
        value: f64,
    },

    /// A projected vector did not match the schema width.
    #[error(transparent)]
    VectorLength(#[from] VectorLengthError),

    /// Local scoring failed after the remote path was unavailable.
    #[error(transparent)]
    LocalInference(#[from] LocalInferenceError),
}

impl From<ReconcileError> for EngineError {
    fn from(error: ReconcileError) -> Self {
        match error {
            ReconcileError::UnknownArea { area } => Self::UnknownArea { area },
            ReconcileError::FeatureMissing { missing } => Self::FeatureMissing { missing },
            ReconcileError::InvalidAdjustment { field, value } => {
                Self::InvalidAdjustment { field, value }
            }
            ReconcileError::NonFinite { feature, value } => Self::NonFinite { feature, value },
            ReconcileError::Schema(e) => Self::Schema(e),
            ReconcileError::Load(e) => Self::Load(e),
            ReconcileError::Length(e) => Self::VectorLength(e),
        }
    }
}

impl EngineError {
    /// The serialisable category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Load(_) => ErrorKind::Load,
            Self::Schema(SchemaError::Unavailable { .. }) => ErrorKind::SchemaUnavailable,
            Self::Schema(SchemaError::Divergent { .. }) => ErrorKind::SchemaDivergent,
            Self::UnknownArea { .. } => ErrorKind::UnknownArea,
            Self::FeatureMissing { .. } | Self::VectorLength(_) => ErrorKind::FeatureMissing,
            Self::InvalidAdjustment { .. } | Self::NonFinite { .. } => ErrorKind::InvalidAdjustment,
            Self::LocalInference(_) => ErrorKind::LocalInference,
        }
    }

    /// Whether the user can fix this by changing their input.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownArea { .. } | Self::InvalidAdjustment { .. } | Self::NonFinite { .. }
        )
    }
}

/// The scenario resolution pipeline.
#[derive(Debug, Clone)]
pub struct ScenarioEngine {
    cache: Arc<ResourceCache>,
    schema: Arc<SchemaResolver>,
    reconciler: FeatureReconciler,
    resolver: InferenceResolver,
}

impl ScenarioEngine {
    /// Builds an engine over `cache` scoring remotely through `remote`.
    #[must_use]
    pub fn new(cache: Arc<ResourceCache>, remote: Arc<dyn RemoteService>) -> Self {
        let schema = Arc::new(SchemaResolver::new(Arc::clone(&cache)));
        Self {
            reconciler: FeatureReconciler::new(Arc::clone(&cache), Arc::clone(&schema)),
            resolver: InferenceResolver::new(remote, Arc::clone(&cache)),
            schema,
            cache,
        }
    }

    /// Builds an engine from the data directory and remote configuration
    /// in the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(
            Arc::new(ResourceCache::from_env()),
            Arc::new(HttpRemote::from_env()),
        )
    }

    /// A new session in the mode the remote configuration allows.
    #[must_use]
    pub fn new_session(&self) -> SessionState {
        self.resolver.new_session()
    }

    /// Reconciles `area_key` under `adjustment` and resolves a prediction.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if reconciliation fails or both inference
    /// paths are exhausted.
    pub async fn evaluate(
        &self,
        session: &mut SessionState,
        area_key: &str,
        adjustment: &ScenarioAdjustment,
    ) -> Result<Prediction, EngineError> {
        let vector = self.reconciler.reconcile(area_key, adjustment)?;
        let prediction = self.resolver.resolve(session, &vector).await?;
        log::info!(
            "Area {area_key}: {:.3} via {} ({} features)",
            prediction.value,
            prediction.path,
            prediction.feature_count
        );
        Ok(prediction)
    }

    /// Like [`ScenarioEngine::evaluate`], with failures folded into the
    /// returned outcome.
    pub async fn outcome(
        &self,
        session: &mut SessionState,
        area_key: &str,
        adjustment: &ScenarioAdjustment,
    ) -> PredictionOutcome {
        match self.evaluate(session, area_key, adjustment).await {
            Ok(prediction) => prediction.into(),
            Err(e) => {
                if e.is_user_error() {
                    log::info!("Rejected scenario for {area_key}: {e}");
                } else {
                    log::error!("Scenario for {area_key} failed: {e}");
                }
                PredictionOutcome::failure(e.kind(), e.to_string())
            }
        }
    }

    /// Probes the remote service, restoring remote mode when it is live.
    pub async fn probe(&self, session: &mut SessionState) -> bool {
        self.resolver.probe(session).await
    }

    /// All areas, in dataset order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Load`] if the dataset cannot be loaded.
    pub fn areas(&self) -> Result<Arc<AreaTable>, EngineError> {
        Ok(self.cache.areas()?)
    }

    /// The model's feature schema.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Schema`] if no schema can be resolved.
    pub fn schema(&self) -> Result<Arc<ModelSchema>, EngineError> {
        Ok(self.schema.resolve()?)
    }

    /// The adjusted working record for an area, before projection.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the area is unknown or an adjustment
    /// targets a field the area lacks.
    pub fn reconciled_record(
        &self,
        area_key: &str,
        adjustment: &ScenarioAdjustment,
    ) -> Result<FeatureRecord, EngineError> {
        Ok(self.reconciler.reconcile_record(area_key, adjustment)?)
    }

    /// The area code whose boundary contains the point, if any.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Load`] if the boundaries cannot be loaded.
    pub fn locate(&self, lng: f64, lat: f64) -> Result<Option<String>, EngineError> {
        let geography = self.cache.geography()?;
        Ok(geography.lookup_area(lng, lat).map(ToString::to_string))
    }

    /// Drops every cached resource and the resolved schema.
    pub fn invalidate(&self) {
        self.cache.invalidate_all();
        self.schema.invalidate();
    }

    /// The shared resource cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }
}
