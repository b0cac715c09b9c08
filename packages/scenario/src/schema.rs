//! Model schema resolution.
//!
//! The fitted scaler's recorded feature names are authoritative: they are
//! the exact list the deployed model was trained on. When the scaler is
//! unavailable or did not record names, the schema falls back to the
//! dataset's feature columns in column order.
//!
//! When both sources are available they must agree name for name. A
//! disagreement fails resolution with [`SchemaError::Divergent`] rather
//! than picking one silently. Dataset columns that the model was not
//! trained on belong in the layout's `auxiliary_columns`.
//!
//! A dataset-derived schema is only memoized once the scaler has loaded.
//! While the scaler keeps failing to load, every resolution retries it, so
//! its names are adopted as soon as it becomes readable.

use std::sync::{Arc, Mutex, PoisonError};

use housing_stress_data::cache::ResourceCache;
use housing_stress_data::{LoadError, ResourceKey};
use housing_stress_scenario_models::{ModelSchema, SchemaSource};
use thiserror::Error;

/// Errors from schema resolution.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Neither the scaler nor the dataset yielded a feature list.
    #[error("No feature schema available (scaler: {scaler}; dataset: {dataset})")]
    Unavailable {
        /// Why the scaler could not provide names.
        scaler: String,
        /// Why the dataset could not provide names.
        #[source]
        dataset: LoadError,
    },

    /// The scaler and dataset feature lists differ.
    #[error(
        "Scaler schema ({scaler_count} features) and dataset schema \
         ({dataset_count} features) diverge at position {position}: \
         {scaler_name:?} vs {dataset_name:?}"
    )]
    Divergent {
        /// Features recorded by the scaler.
        scaler_count: usize,
        /// Feature columns in the dataset.
        dataset_count: usize,
        /// First differing position.
        position: usize,
        /// Scaler name at `position`, if any.
        scaler_name: Option<String>,
        /// Dataset name at `position`, if any.
        dataset_name: Option<String>,
    },
}

/// Resolves and memoizes the [`ModelSchema`].
#[derive(Debug)]
pub struct SchemaResolver {
    cache: Arc<ResourceCache>,
    resolved: Mutex<Option<Arc<ModelSchema>>>,
}

impl SchemaResolver {
    /// Creates a resolver reading from `cache`.
    #[must_use]
    pub const fn new(cache: Arc<ResourceCache>) -> Self {
        Self {
            cache,
            resolved: Mutex::new(None),
        }
    }

    /// Returns the schema, deriving it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if no source is loadable or the sources
    /// disagree.
    pub fn resolve(&self) -> Result<Arc<ModelSchema>, SchemaError> {
        let mut slot = self.resolved.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(schema) = slot.as_ref() {
            return Ok(Arc::clone(schema));
        }

        let schema = Arc::new(derive_schema(&self.cache)?);
        log::info!(
            "Resolved model schema: {} features from {}",
            schema.len(),
            schema.source()
        );
        if schema.source() == SchemaSource::Scaler || self.cache.is_loaded(ResourceKey::Scaler) {
            *slot = Some(Arc::clone(&schema));
        }
        drop(slot);
        Ok(schema)
    }

    /// Forgets the resolved schema.
    pub fn invalidate(&self) {
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Derives the schema from the cached resources without memoizing.
///
/// # Errors
///
/// See [`SchemaResolver::resolve`].
pub fn derive_schema(cache: &ResourceCache) -> Result<ModelSchema, SchemaError> {
    let scaler_names = match cache.scaler() {
        Ok(scaler) => scaler
            .feature_names()
            .map(<[String]>::to_vec)
            .ok_or_else(|| "scaler did not record feature names".to_string()),
        Err(e) => Err(e.to_string()),
    };

    let dataset_names = cache.areas().and_then(|table| {
        if table.feature_columns().is_empty() {
            Err(LoadError::malformed(ResourceKey::Areas, "no feature columns"))
        } else {
            Ok(table.feature_columns().to_vec())
        }
    });

    match scaler_names {
        Ok(names) => {
            match &dataset_names {
                Ok(columns) => check_agreement(&names, columns)?,
                Err(e) => log::warn!("Dataset unavailable for schema cross-check: {e}"),
            }
            Ok(ModelSchema::new(names, SchemaSource::Scaler))
        }
        Err(scaler) => {
            log::warn!("Scaler schema unavailable ({scaler}); deriving from dataset columns");
            let columns =
                dataset_names.map_err(|dataset| SchemaError::Unavailable { scaler, dataset })?;
            Ok(ModelSchema::new(columns, SchemaSource::Dataset))
        }
    }
}

/// Index of the first position where two name lists differ.
#[must_use]
pub fn first_divergence(a: &[String], b: &[String]) -> Option<usize> {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .or_else(|| (a.len() != b.len()).then_some(a.len().min(b.len())))
}

fn check_agreement(scaler: &[String], dataset: &[String]) -> Result<(), SchemaError> {
    first_divergence(scaler, dataset).map_or(Ok(()), |position| {
        Err(SchemaError::Divergent {
            scaler_count: scaler.len(),
            dataset_count: dataset.len(),
            position,
            scaler_name: scaler.get(position).cloned(),
            dataset_name: dataset.get(position).cloned(),
        })
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use housing_stress_data::artifacts::ScalerArtifact;
    use housing_stress_data::dataset::{AreaTable, DataLayout};

    use super::*;

    const DATASET: &str = "area_code,area_name,avg_weekly_income,avg_weekly_rent,housing_stress_index\n\
                           A,Alpha,1800,400,10\n";

    fn areas() -> Result<AreaTable, LoadError> {
        AreaTable::from_reader(DATASET.as_bytes(), &DataLayout::default())
    }

    fn scaler(names: Option<&[&str]>) -> ScalerArtifact {
        let width = names.map_or(2, <[&str]>::len);
        ScalerArtifact::Standard {
            feature_names_in: names.map(|n| n.iter().map(ToString::to_string).collect()),
            mean: vec![0.0; width],
            scale: vec![1.0; width],
        }
    }

    fn missing(key: ResourceKey) -> LoadError {
        LoadError::io(
            format!("/nonexistent/{key}"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        )
    }

    #[test]
    fn scaler_names_are_authoritative() {
        let cache = ResourceCache::from_env()
            .with_areas_loader(areas)
            .with_scaler_loader(|| Ok(scaler(Some(&["avg_weekly_income", "avg_weekly_rent"]))));

        let schema = derive_schema(&cache).unwrap();
        assert_eq!(schema.source(), SchemaSource::Scaler);
        assert_eq!(schema.names(), ["avg_weekly_income", "avg_weekly_rent"]);
    }

    #[test]
    fn falls_back_to_dataset_columns() {
        let cache = ResourceCache::from_env()
            .with_areas_loader(areas)
            .with_scaler_loader(|| Err(missing(ResourceKey::Scaler)));

        let schema = derive_schema(&cache).unwrap();
        assert_eq!(schema.source(), SchemaSource::Dataset);
        assert_eq!(schema.names(), ["avg_weekly_income", "avg_weekly_rent"]);
    }

    #[test]
    fn unnamed_scaler_falls_back_to_dataset() {
        let cache = ResourceCache::from_env()
            .with_areas_loader(areas)
            .with_scaler_loader(|| Ok(scaler(None)));

        assert_eq!(derive_schema(&cache).unwrap().source(), SchemaSource::Dataset);
    }

    #[test]
    fn scaler_without_dataset_still_resolves() {
        let cache = ResourceCache::from_env()
            .with_areas_loader(|| Err(missing(ResourceKey::Areas)))
            .with_scaler_loader(|| Ok(scaler(Some(&["x", "y"]))));

        assert_eq!(derive_schema(&cache).unwrap().names(), ["x", "y"]);
    }

    #[test]
    fn no_source_is_unavailable() {
        let cache = ResourceCache::from_env()
            .with_areas_loader(|| Err(missing(ResourceKey::Areas)))
            .with_scaler_loader(|| Err(missing(ResourceKey::Scaler)));

        assert!(matches!(
            derive_schema(&cache),
            Err(SchemaError::Unavailable { .. })
        ));
    }

    #[test]
    fn reordered_sources_diverge() {
        let cache = ResourceCache::from_env()
            .with_areas_loader(areas)
            .with_scaler_loader(|| Ok(scaler(Some(&["avg_weekly_rent", "avg_weekly_income"]))));

        let err = derive_schema(&cache).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Divergent {
                position: 0,
                scaler_count: 2,
                dataset_count: 2,
                ..
            }
        ));
    }

    #[test]
    fn extra_dataset_column_diverges() {
        let cache = ResourceCache::from_env()
            .with_areas_loader(areas)
            .with_scaler_loader(|| Ok(scaler(Some(&["avg_weekly_income"]))));

        let err = derive_schema(&cache).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Divergent {
                position: 1,
                scaler_name: None,
                ..
            }
        ));
    }

    #[test]
    fn first_divergence_positions() {
        let a: Vec<String> = vec!["a".into(), "b".into()];
        let b: Vec<String> = vec!["a".into(), "c".into()];
        assert_eq!(first_divergence(&a, &a), None);
        assert_eq!(first_divergence(&a, &b), Some(1));
        assert_eq!(first_divergence(&a, &a[..1]), Some(1));
    }

    #[test]
    fn resolver_memoizes() {
        let cache = Arc::new(
            ResourceCache::from_env()
                .with_areas_loader(areas)
                .with_scaler_loader(|| Ok(scaler(Some(&["avg_weekly_income", "avg_weekly_rent"])))),
        );
        let resolver = SchemaResolver::new(Arc::clone(&cache));

        let first = resolver.resolve().unwrap();
        let second = resolver.resolve().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        resolver.invalidate();
        assert!(!Arc::ptr_eq(&first, &resolver.resolve().unwrap()));
    }

    #[test]
    fn unnamed_scaler_fallback_is_memoized() {
        let cache = Arc::new(
            ResourceCache::from_env()
                .with_areas_loader(areas)
                .with_scaler_loader(|| Ok(scaler(None))),
        );
        let resolver = SchemaResolver::new(cache);

        let first = resolver.resolve().unwrap();
        assert_eq!(first.source(), SchemaSource::Dataset);
        assert!(Arc::ptr_eq(&first, &resolver.resolve().unwrap()));
    }

    #[test]
    fn scaler_is_adopted_once_it_loads() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let cache = Arc::new(
            ResourceCache::from_env()
                .with_areas_loader(areas)
                .with_scaler_loader(move || {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(missing(ResourceKey::Scaler))
                    } else {
                        Ok(scaler(Some(&["avg_weekly_income", "avg_weekly_rent"])))
                    }
                }),
        );
        let resolver = SchemaResolver::new(cache);

        assert_eq!(resolver.resolve().unwrap().source(), SchemaSource::Dataset);
        let schema = resolver.resolve().unwrap();
        assert_eq!(schema.source(), SchemaSource::Scaler);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert!(Arc::ptr_eq(&schema, &resolver.resolve().unwrap()));
    }

    #[test]
    fn auxiliary_dataset_column_does_not_diverge() {
        const MODEL_FEATURES: [&str; 7] = [
            "avg_weekly_income",
            "avg_weekly_rent",
            "avg_weekly_mortgage",
            "unemployment_rate",
            "income_rent_gap",
            "mining_concentration_ratio",
            "population",
        ];
        const WIDE: &str = "area_code,area_name,avg_weekly_income,avg_weekly_rent,\
                            avg_weekly_mortgage,unemployment_rate,income_rent_gap,\
                            mining_concentration_ratio,population,total_mining,housing_stress_index\n\
                            A,Alpha,1800,400,500,4.2,1400,0.2,5000,1000,10\n";

        let with_layout = |layout: DataLayout| {
            ResourceCache::from_env()
                .with_areas_loader(move || AreaTable::from_reader(WIDE.as_bytes(), &layout))
                .with_scaler_loader(|| Ok(scaler(Some(&MODEL_FEATURES))))
        };

        let err = derive_schema(&with_layout(DataLayout::default())).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Divergent {
                scaler_count: 7,
                dataset_count: 8,
                position: 7,
                ..
            }
        ));

        let layout = DataLayout {
            auxiliary_columns: vec!["total_mining".to_string()],
            ..DataLayout::default()
        };
        let schema = derive_schema(&with_layout(layout)).unwrap();
        assert_eq!(schema.source(), SchemaSource::Scaler);
        assert_eq!(schema.names(), MODEL_FEATURES);
    }
}
