//! Load-once cache for the engine's expensive resources.
//!
//! Each [`CacheEntry`] pairs a loader with a slot guarded by a mutex. The
//! lock is held for the whole first load, so concurrent first callers
//! block until the value is ready and then share the same [`Arc`] instead
//! of loading twice. A failed load leaves the slot empty; the error is
//! returned to the caller as-is and nothing is retried implicitly.
//!
//! Slots are only ever replaced whole (filled, or cleared by
//! [`CacheEntry::invalidate`]), so a poisoned lock still guards a
//! consistent value and is recovered rather than propagated.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::artifacts::{LinearModel, ScalerArtifact};
use crate::dataset::{AreaTable, DataLayout};
use crate::geography::GeographyIndex;
use crate::paths::DataPaths;
use crate::{LoadError, ResourceKey};

type Loader<T> = Box<dyn Fn() -> Result<T, LoadError> + Send + Sync>;

/// A lazily loaded, shared resource.
pub struct CacheEntry<T> {
    key: ResourceKey,
    loader: Loader<T>,
    slot: Mutex<Option<Arc<T>>>,
}

impl<T> std::fmt::Debug for CacheEntry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

impl<T> CacheEntry<T> {
    /// Creates an empty entry that will call `loader` on first use.
    pub fn new<F>(key: ResourceKey, loader: F) -> Self
    where
        F: Fn() -> Result<T, LoadError> + Send + Sync + 'static,
    {
        Self {
            key,
            loader: Box::new(loader),
            slot: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<T>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached value, loading it first if necessary.
    ///
    /// # Errors
    ///
    /// Returns the loader's [`LoadError`] if the first load fails.
    pub fn get_or_load(&self) -> Result<Arc<T>, LoadError> {
        let mut slot = self.lock();
        if let Some(value) = slot.as_ref() {
            return Ok(Arc::clone(value));
        }

        log::debug!("Loading {} (first use)", self.key);
        let value = Arc::new((self.loader)().inspect_err(|e| {
            log::error!("Failed to load {}: {e}", self.key);
        })?);
        *slot = Some(Arc::clone(&value));
        drop(slot);
        Ok(value)
    }

    /// Returns the cached value without loading.
    #[must_use]
    pub fn get_if_loaded(&self) -> Option<Arc<T>> {
        self.lock().as_ref().map(Arc::clone)
    }

    /// Whether the value has been loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.lock().is_some()
    }

    /// Drops the cached value so the next access reloads it.
    pub fn invalidate(&self) {
        if self.lock().take().is_some() {
            log::debug!("Invalidated {}", self.key);
        }
    }
}

/// The engine's process-wide resources.
///
/// Construct once and share behind an [`Arc`]; every accessor loads its
/// resource at most once until invalidated.
#[derive(Debug)]
pub struct ResourceCache {
    areas: CacheEntry<AreaTable>,
    geography: CacheEntry<GeographyIndex>,
    model: CacheEntry<LinearModel>,
    scaler: CacheEntry<ScalerArtifact>,
}

impl ResourceCache {
    /// Creates a cache that reads the files in `paths` with a fixed
    /// `layout`. The `paths.layout` file is not consulted.
    #[must_use]
    pub fn new(paths: DataPaths, layout: DataLayout) -> Self {
        let DataPaths {
            areas,
            boundaries,
            scaler,
            model,
            ..
        } = paths;
        let code_property = layout.boundary_code_property.clone();

        Self {
            areas: CacheEntry::new(ResourceKey::Areas, move || {
                AreaTable::load(&areas, &layout)
            }),
            geography: CacheEntry::new(ResourceKey::Geography, move || {
                GeographyIndex::load(&boundaries, &code_property)
            }),
            model: CacheEntry::new(ResourceKey::Model, move || LinearModel::load(&model)),
            scaler: CacheEntry::new(ResourceKey::Scaler, move || ScalerArtifact::load(&scaler)),
        }
    }

    /// Creates a cache that reads the files in `paths`, taking the column
    /// layout from `paths.layout` (or the defaults when that file is
    /// absent) each time the dataset or boundaries load.
    #[must_use]
    pub fn with_layout_file(paths: DataPaths) -> Self {
        let DataPaths {
            areas,
            layout,
            boundaries,
            scaler,
            model,
        } = paths;
        let boundary_layout = layout.clone();

        Self {
            areas: CacheEntry::new(ResourceKey::Areas, move || {
                AreaTable::load(&areas, &DataLayout::load_or_default(&layout)?)
            }),
            geography: CacheEntry::new(ResourceKey::Geography, move || {
                let layout = DataLayout::load_or_default(&boundary_layout)?;
                GeographyIndex::load(&boundaries, &layout.boundary_code_property)
            }),
            model: CacheEntry::new(ResourceKey::Model, move || LinearModel::load(&model)),
            scaler: CacheEntry::new(ResourceKey::Scaler, move || ScalerArtifact::load(&scaler)),
        }
    }

    /// Creates a cache over the default data directory and its optional
    /// `layout.toml`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_layout_file(DataPaths::from_env())
    }

    /// Replaces the area dataset loader.
    #[must_use]
    pub fn with_areas_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn() -> Result<AreaTable, LoadError> + Send + Sync + 'static,
    {
        self.areas = CacheEntry::new(ResourceKey::Areas, loader);
        self
    }

    /// Replaces the boundary loader.
    #[must_use]
    pub fn with_geography_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn() -> Result<GeographyIndex, LoadError> + Send + Sync + 'static,
    {
        self.geography = CacheEntry::new(ResourceKey::Geography, loader);
        self
    }

    /// Replaces the model loader.
    #[must_use]
    pub fn with_model_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn() -> Result<LinearModel, LoadError> + Send + Sync + 'static,
    {
        self.model = CacheEntry::new(ResourceKey::Model, loader);
        self
    }

    /// Replaces the scaler loader.
    #[must_use]
    pub fn with_scaler_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn() -> Result<ScalerArtifact, LoadError> + Send + Sync + 'static,
    {
        self.scaler = CacheEntry::new(ResourceKey::Scaler, loader);
        self
    }

    /// The area dataset.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the dataset cannot be loaded.
    pub fn areas(&self) -> Result<Arc<AreaTable>, LoadError> {
        self.areas.get_or_load()
    }

    /// The boundary index.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the boundaries cannot be loaded.
    pub fn geography(&self) -> Result<Arc<GeographyIndex>, LoadError> {
        self.geography.get_or_load()
    }

    /// The regression model.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the model cannot be loaded.
    pub fn model(&self) -> Result<Arc<LinearModel>, LoadError> {
        self.model.get_or_load()
    }

    /// The feature scaler.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the scaler cannot be loaded.
    pub fn scaler(&self) -> Result<Arc<ScalerArtifact>, LoadError> {
        self.scaler.get_or_load()
    }

    /// Whether a resource is currently cached.
    #[must_use]
    pub fn is_loaded(&self, key: ResourceKey) -> bool {
        match key {
            ResourceKey::Areas => self.areas.is_loaded(),
            ResourceKey::Geography => self.geography.is_loaded(),
            ResourceKey::Model => self.model.is_loaded(),
            ResourceKey::Scaler => self.scaler.is_loaded(),
        }
    }

    /// Drops a cached resource so the next access reloads it.
    pub fn invalidate(&self, key: ResourceKey) {
        match key {
            ResourceKey::Areas => self.areas.invalidate(),
            ResourceKey::Geography => self.geography.invalidate(),
            ResourceKey::Model => self.model.invalidate(),
            ResourceKey::Scaler => self.scaler.invalidate(),
        }
    }

    /// Drops every cached resource.
    pub fn invalidate_all(&self) {
        for key in ResourceKey::all() {
            self.invalidate(*key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn counting_entry(counter: &Arc<AtomicUsize>) -> CacheEntry<String> {
        let counter = Arc::clone(counter);
        CacheEntry::new(ResourceKey::Areas, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            Ok("loaded".to_string())
        })
    }

    #[test]
    fn loads_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let entry = counting_entry(&counter);

        assert!(!entry.is_loaded());
        let first = entry.get_or_load().unwrap();
        let second = entry.get_or_load().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(entry.is_loaded());
    }

    #[test]
    fn concurrent_first_access_shares_one_load() {
        let counter = Arc::new(AtomicUsize::new(0));
        let entry = counting_entry(&counter);

        let values: Vec<Arc<String>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| entry.get_or_load().unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        for value in &values {
            assert!(Arc::ptr_eq(value, &values[0]));
        }
    }

    #[test]
    fn invalidate_forces_reload() {
        let counter = Arc::new(AtomicUsize::new(0));
        let entry = counting_entry(&counter);

        let first = entry.get_or_load().unwrap();
        entry.invalidate();
        assert!(entry.get_if_loaded().is_none());
        let second = entry.get_or_load().unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_load_is_not_cached() {
        let counter = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&counter);
        let entry: CacheEntry<String> = CacheEntry::new(ResourceKey::Model, move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LoadError::malformed(ResourceKey::Model, "broken"))
        });

        assert!(entry.get_or_load().is_err());
        assert!(entry.get_or_load().is_err());
        assert!(!entry.is_loaded());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_files_surface_io_errors() {
        let cache = ResourceCache::new(
            DataPaths::in_dir(std::path::Path::new("/nonexistent/housing")),
            DataLayout::default(),
        );
        assert!(matches!(cache.areas(), Err(LoadError::Io { .. })));
        assert!(matches!(cache.scaler(), Err(LoadError::Io { .. })));
        assert!(!cache.is_loaded(ResourceKey::Areas));
    }

    #[test]
    fn replaced_loaders_are_used_and_invalidated_by_key() {
        let cache = ResourceCache::from_env()
            .with_model_loader(|| {
                Ok(LinearModel {
                    coefficients: vec![1.0],
                    intercept: 0.0,
                })
            })
            .with_areas_loader(|| {
                AreaTable::from_reader(
                    "area_code,x,housing_stress_index\nA,1,2\n".as_bytes(),
                    &DataLayout::default(),
                )
            });

        assert_eq!(cache.model().unwrap().n_features(), 1);
        assert_eq!(cache.areas().unwrap().len(), 1);
        assert!(cache.is_loaded(ResourceKey::Model));

        cache.invalidate(ResourceKey::Model);
        assert!(!cache.is_loaded(ResourceKey::Model));
        assert!(cache.is_loaded(ResourceKey::Areas));

        cache.invalidate_all();
        assert!(!cache.is_loaded(ResourceKey::Areas));
    }

    #[test]
    fn layout_file_drives_the_dataset_columns() {
        let dir = std::env::temp_dir()
            .join(format!("housing_stress_layout_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("areas.csv"),
            "code,x,total_mining,housing_stress_index\nA,1,50,2\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("layout.toml"),
            "id_column = \"code\"\nauxiliary_columns = [\"total_mining\"]\n",
        )
        .unwrap();

        let cache = ResourceCache::with_layout_file(DataPaths::in_dir(&dir));
        let areas = cache.areas().unwrap();
        assert_eq!(areas.feature_columns(), ["x"]);
        assert_eq!(areas.get("A").unwrap().baseline.get("total_mining"), Some(50.0));

        std::fs::write(dir.join("layout.toml"), "id_column = [1]\n").unwrap();
        cache.invalidate(ResourceKey::Areas);
        assert!(matches!(cache.areas(), Err(LoadError::Layout { .. })));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
