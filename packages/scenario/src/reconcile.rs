//! Scenario reconciliation.
//!
//! Merges an area's baseline record with a [`ScenarioAdjustment`] and
//! projects the result onto the model schema:
//!
//! | Adjustment         | Field                 | Rule                       |
//! |--------------------|-----------------------|----------------------------|
//! | `income_adj`       | `avg_weekly_income`   | add                        |
//! | `rent_adj`         | `avg_weekly_rent`     | add                        |
//! | `mortgage_adj`     | `avg_weekly_mortgage` | add                        |
//! | `unemployment_adj` | `unemployment_rate`   | add, floor at zero         |
//! | `mining_pct_adj`   | `total_mining`        | scale by percent, floor at zero |
//!
//! Engineered features follow their inputs when the record has them:
//! `income_rent_gap` shifts by `income_adj - rent_adj` and
//! `mining_concentration_ratio` scales with the mining workforce.
//!
//! A zero delta never touches its field, so a zero adjustment reproduces
//! the baseline exactly. `NaN` and infinite deltas are rejected up front,
//! and a projected vector never carries a non-finite value.

use std::sync::Arc;

use housing_stress_data::LoadError;
use housing_stress_data::cache::ResourceCache;
use housing_stress_scenario_models::{
    FeatureRecord, FeatureVector, KnownFeature, ModelSchema, ScenarioAdjustment,
    VectorLengthError,
};
use thiserror::Error;

use crate::schema::{SchemaError, SchemaResolver};

/// Errors from reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// No area matches the requested identifier or name.
    #[error("Unknown area '{area}'")]
    UnknownArea {
        /// The identifier or name that was requested.
        area: String,
    },

    /// The working record lacks features the schema or an adjustment needs.
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

    /// Adjusting the record produced a `NaN` or infinite feature value.
    #[error("Feature '{feature}' is not a finite number ({value})")]
    NonFinite {
        /// Feature name.
        feature: String,
        /// The offending value.
        value: f64,
    },

    /// The model schema could not be resolved.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The area dataset could not be loaded.
    #[error("Failed to load area dataset: {0}")]
    Load(#[from] LoadError),

    /// The projected vector did not match the schema width.
    #[error(transparent)]
    Length(#[from] VectorLengthError),
}

impl ReconcileError {
    fn missing(feature: impl Into<String>) -> Self {
        Self::FeatureMissing {
            missing: vec![feature.into()],
        }
    }
}

/// Builds model-ready feature vectors for scenarios.
#[derive(Debug, Clone)]
pub struct FeatureReconciler {
    cache: Arc<ResourceCache>,
    schema: Arc<SchemaResolver>,
}

impl FeatureReconciler {
    /// Creates a reconciler over the shared cache and schema.
    #[must_use]
    pub const fn new(cache: Arc<ResourceCache>, schema: Arc<SchemaResolver>) -> Self {
        Self { cache, schema }
    }

    /// Produces the feature vector for `area_key` under `adjustment`.
    ///
    /// `area_key` may be an area identifier or display name.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] if the area is unknown, the schema cannot
    /// be resolved, or the working record lacks a schema feature.
    pub fn reconcile(
        &self,
        area_key: &str,
        adjustment: &ScenarioAdjustment,
    ) -> Result<FeatureVector, ReconcileError> {
        let record = self.reconcile_record(area_key, adjustment)?;
        let schema = self.schema.resolve()?;
        project(&record, schema)
    }

    /// Produces the adjusted working record without projecting it.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] if the area is unknown or an adjustment
    /// targets a field the area does not have.
    pub fn reconcile_record(
        &self,
        area_key: &str,
        adjustment: &ScenarioAdjustment,
    ) -> Result<FeatureRecord, ReconcileError> {
        let areas = self.cache.areas()?;
        let area = areas
            .find(area_key)
            .ok_or_else(|| ReconcileError::UnknownArea {
                area: area_key.to_string(),
            })?;
        log::debug!(
            "Reconciling area {} ({}) with {adjustment:?}",
            area.area_id,
            area.name
        );
        apply_adjustment(&area.baseline, adjustment)
    }

    /// The unadjusted feature vector for `area_key`.
    ///
    /// # Errors
    ///
    /// See [`FeatureReconciler::reconcile`].
    pub fn baseline_vector(&self, area_key: &str) -> Result<FeatureVector, ReconcileError> {
        self.reconcile(area_key, &ScenarioAdjustment::ZERO)
    }
}

/// Applies `adjustment` to a copy of `baseline`.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidAdjustment`] if a delta is not finite,
/// or [`ReconcileError::FeatureMissing`] if a non-zero delta targets a
/// field absent from `baseline`.
pub fn apply_adjustment(
    baseline: &FeatureRecord,
    adjustment: &ScenarioAdjustment,
) -> Result<FeatureRecord, ReconcileError> {
    if let Some((field, value)) = adjustment.first_non_finite() {
        return Err(ReconcileError::InvalidAdjustment {
            field: field.to_string(),
            value,
        });
    }

    let mut working = baseline.clone();

    shift(&mut working, KnownFeature::AvgWeeklyIncome, adjustment.income_adj, false)?;
    shift(&mut working, KnownFeature::AvgWeeklyRent, adjustment.rent_adj, false)?;
    shift(&mut working, KnownFeature::AvgWeeklyMortgage, adjustment.mortgage_adj, false)?;
    shift(&mut working, KnownFeature::UnemploymentRate, adjustment.unemployment_adj, true)?;

    if !is_noop(adjustment.mining_pct_adj) {
        let multiplier = adjustment.mining_multiplier();
        let total = working
            .known(KnownFeature::TotalMining)
            .ok_or_else(|| ReconcileError::missing(KnownFeature::TotalMining.to_string()))?;
        working.set(KnownFeature::TotalMining, (total * multiplier).max(0.0));

        if let Some(ratio) = working.known(KnownFeature::MiningConcentrationRatio) {
            working.set(
                KnownFeature::MiningConcentrationRatio,
                (ratio * multiplier).max(0.0),
            );
        }
    }

    let gap_delta = adjustment.income_adj - adjustment.rent_adj;
    if !is_noop(gap_delta) {
        if let Some(gap) = working.known(KnownFeature::IncomeRentGap) {
            working.set(KnownFeature::IncomeRentGap, gap + gap_delta);
        }
    }

    Ok(working)
}

/// Orders `record`'s values by `schema`.
///
/// # Errors
///
/// Returns [`ReconcileError::FeatureMissing`] listing every schema name
/// absent from `record`, or [`ReconcileError::NonFinite`] for the first
/// value that is `NaN` or infinite.
pub fn project(
    record: &FeatureRecord,
    schema: Arc<ModelSchema>,
) -> Result<FeatureVector, ReconcileError> {
    let mut values = Vec::with_capacity(schema.len());
    let mut missing = Vec::new();

    for name in schema.names() {
        match record.get(name) {
            Some(value) => values.push(value),
            None => missing.push(name.clone()),
        }
    }

    if !missing.is_empty() {
        log::warn!(
            "Working record is missing {} of {} schema features",
            missing.len(),
            schema.len()
        );
        return Err(ReconcileError::FeatureMissing { missing });
    }

    if let Some((name, value)) = schema
        .names()
        .iter()
        .zip(&values)
        .find(|(_, value)| !value.is_finite())
    {
        return Err(ReconcileError::NonFinite {
            feature: name.clone(),
            value: *value,
        });
    }

    Ok(FeatureVector::try_new(schema, values)?)
}

#[allow(clippy::float_cmp)]
fn is_noop(delta: f64) -> bool {
    delta == 0.0
}

fn shift(
    record: &mut FeatureRecord,
    feature: KnownFeature,
    delta: f64,
    floor_at_zero: bool,
) -> Result<(), ReconcileError> {
    if is_noop(delta) {
        return Ok(());
    }
    let base = record
        .known(feature)
        .ok_or_else(|| ReconcileError::missing(feature.to_string()))?;
    let value = base + delta;
    record.set(feature, if floor_at_zero { value.max(0.0) } else { value });
    Ok(())
}
