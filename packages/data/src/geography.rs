//! In-memory boundary index for area selection.
//!
//! Loads area polygons from a `GeoJSON` `FeatureCollection`, builds an
//! R-tree over their bounding boxes, and answers point-in-polygon lookups
//! (a map click resolves to the area code the dataset is keyed by).

use std::collections::BTreeMap;
use std::path::Path;

use geo::{BoundingRect as _, Centroid as _, Contains as _, MultiPolygon};
use geojson::GeoJson;
use housing_stress_scenario_models::Centroid;
use rstar::{AABB, RTree, RTreeObject};

use crate::{LoadError, ResourceKey};

/// A boundary polygon stored in the R-tree with its area code.
struct BoundaryEntry {
    area_code: String,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for BoundaryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Spatial index over every area boundary.
pub struct GeographyIndex {
    boundaries: RTree<BoundaryEntry>,
    centroids: BTreeMap<String, Centroid>,
}

impl std::fmt::Debug for GeographyIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeographyIndex")
            .field("boundaries", &self.boundaries.size())
            .finish_non_exhaustive()
    }
}

impl GeographyIndex {
    /// Reads and indexes the boundary file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the file cannot be read or is not a
    /// `GeoJSON` `FeatureCollection`.
    pub fn load(path: &Path, code_property: &str) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
        let index = Self::from_geojson_str(&text, code_property)?;
        log::info!(
            "Loaded {} area boundaries into spatial index from {}",
            index.len(),
            path.display()
        );
        Ok(index)
    }

    /// Indexes a `GeoJSON` `FeatureCollection` document.
    ///
    /// Features without a code property or without a polygonal geometry
    /// are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the document does not parse or is not a
    /// `FeatureCollection`.
    pub fn from_geojson_str(text: &str, code_property: &str) -> Result<Self, LoadError> {
        let GeoJson::FeatureCollection(collection) = text.parse::<GeoJson>()? else {
            return Err(LoadError::malformed(
                ResourceKey::Geography,
                "expected a FeatureCollection",
            ));
        };

        let mut entries = Vec::with_capacity(collection.features.len());
        let mut centroids = BTreeMap::new();

        for feature in collection.features {
            let Some(area_code) = feature.property(code_property).and_then(property_to_code)
            else {
                log::warn!("Skipping boundary feature without '{code_property}'");
                continue;
            };

            let Some(polygon) = feature.geometry.and_then(to_multipolygon) else {
                log::warn!("Skipping boundary {area_code}: geometry is not polygonal");
                continue;
            };

            if let Some(point) = polygon.centroid() {
                centroids.entry(area_code.clone()).or_insert(Centroid {
                    latitude: point.y(),
                    longitude: point.x(),
                });
            }

            entries.push(BoundaryEntry {
                envelope: compute_envelope(&polygon),
                area_code,
                polygon,
            });
        }

        Ok(Self {
            boundaries: RTree::bulk_load(entries),
            centroids,
        })
    }

    /// Returns the code of the area containing the point, if any.
    ///
    /// Area boundaries tile without overlap, so the first match wins.
    #[must_use]
    pub fn lookup_area(&self, lng: f64, lat: f64) -> Option<&str> {
        let point = geo::Point::new(lng, lat);
        let query_env = AABB::from_point([lng, lat]);

        self.boundaries
            .locate_in_envelope_intersecting(&query_env)
            .find(|entry| entry.polygon.contains(&point))
            .map(|entry| entry.area_code.as_str())
    }

    /// Returns the polygon centroid of an area.
    #[must_use]
    pub fn centroid(&self, area_code: &str) -> Option<Centroid> {
        self.centroids.get(area_code).copied()
    }

    /// Whether a boundary exists for `area_code`.
    #[must_use]
    pub fn contains(&self, area_code: &str) -> bool {
        self.centroids.contains_key(area_code)
    }

    /// Number of indexed boundaries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.boundaries.size()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.boundaries.size() == 0
    }
}

/// Area codes are sometimes stored as numbers in boundary files.
fn property_to_code(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
