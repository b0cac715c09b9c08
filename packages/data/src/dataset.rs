//! Tabular area dataset loader.
//!
//! One CSV row per area. Besides the identifier, display name, target, and
//! optional centroid columns, every column is a numeric model feature.
//! Blank feature cells are left out of the area's baseline record so that
//! a schema requiring them fails during reconciliation instead of scoring
//! a made-up value. Non-finite cells (`NaN`, `inf`) are rejected.
//!
//! The column roles come from [`DataLayout`], which can be read from a
//! `layout.toml` next to the dataset:
//!
//! ```toml
//! id_column = "SA2_CODE21"
//! name_column = "SA2_NAME21"
//! auxiliary_columns = ["total_mining"]
//! ```

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use housing_stress_scenario_models::{AreaRecord, Centroid, FeatureRecord};
use serde::Deserialize;

use crate::{LoadError, ResourceKey};

/// Column roles for the area dataset and the boundary file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DataLayout {
    /// Unique area identifier column.
    pub id_column: String,
    /// Display name column. Falls back to the identifier when absent.
    pub name_column: String,
    /// Observed target column.
    pub target_column: String,
    /// Centroid latitude column, if the dataset has one.
    pub latitude_column: String,
    /// Centroid longitude column, if the dataset has one.
    pub longitude_column: String,
    /// Additional non-feature columns to ignore.
    pub excluded_columns: Vec<String>,
    /// Numeric columns kept in each baseline record for scenario
    /// adjustments but not offered to the model as features.
    pub auxiliary_columns: Vec<String>,
    /// `GeoJSON` feature property holding the joinable area code.
    pub boundary_code_property: String,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self {
            id_column: "area_code".to_string(),
            name_column: "area_name".to_string(),
            target_column: "housing_stress_index".to_string(),
            latitude_column: "latitude".to_string(),
            longitude_column: "longitude".to_string(),
            excluded_columns: Vec::new(),
            auxiliary_columns: Vec::new(),
            boundary_code_property: "area_code".to_string(),
        }
    }
}

impl DataLayout {
    /// Parses a layout from TOML. Omitted keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Layout`] if the document is not a valid layout.
    pub fn from_toml_str(path: &Path, text: &str) -> Result<Self, LoadError> {
        toml::de::from_str(text).map_err(|source| LoadError::Layout {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads the layout file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
        let layout = Self::from_toml_str(path, &text)?;
        log::debug!("Loaded data layout from {}", path.display());
        Ok(layout)
    }

    /// Reads the layout file at `path`, or the default layout if there is
    /// no such file.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the file exists but cannot be read or
    /// parsed.
    pub fn load_or_default(path: &Path) -> Result<Self, LoadError> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("No data layout at {}; using defaults", path.display());
            Ok(Self::default())
        }
    }
}

/// Column positions resolved from the CSV header.
struct HeaderIndex {
    id: usize,
    name: Option<usize>,
    target: usize,
    centroid: Option<(usize, usize)>,
    features: Vec<(usize, String)>,
    auxiliary: Vec<(usize, String)>,
}

impl HeaderIndex {
    fn resolve(headers: &csv::StringRecord, layout: &DataLayout) -> Result<Self, LoadError> {
        let position = |column: &str| headers.iter().position(|h| h == column);
        let required = |column: &str| {
            position(column).ok_or_else(|| LoadError::MissingColumn {
                resource: ResourceKey::Areas,
                column: column.to_string(),
            })
        };

        let id = required(&layout.id_column)?;
        let target = required(&layout.target_column)?;
        let name = position(&layout.name_column);
        let latitude = position(&layout.latitude_column);
        let longitude = position(&layout.longitude_column);
        let centroid = latitude.zip(longitude);

        let (auxiliary, features) = headers
            .iter()
            .enumerate()
            .filter(|(i, header)| {
                *i != id
                    && *i != target
                    && Some(*i) != name
                    && Some(*i) != latitude
                    && Some(*i) != longitude
                    && !layout.excluded_columns.iter().any(|c| c == header)
            })
            .map(|(i, header)| (i, header.to_string()))
            .partition(|(_, header)| layout.auxiliary_columns.contains(header));

        Ok(Self {
            id,
            name,
            target,
            centroid,
            features,
            auxiliary,
        })
    }
}

/// All area records, in dataset order.
#[derive(Debug, Clone)]
pub struct AreaTable {
    records: Vec<AreaRecord>,
    by_id: BTreeMap<String, usize>,
    feature_columns: Vec<String>,
}

impl AreaTable {
    /// Reads the dataset at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the file cannot be read, a required column
    /// is missing, a cell is not numeric, or an identifier repeats.
    pub fn load(path: &Path, layout: &DataLayout) -> Result<Self, LoadError> {
        let file = std::fs::File::open(path).map_err(|e| LoadError::io(path, e))?;
        let table = Self::from_reader(file, layout)?;
        log::info!(
            "Loaded {} areas with {} feature columns from {}",
            table.len(),
            table.feature_columns.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parses a CSV dataset from any reader.
    ///
    /// # Errors
    ///
    /// See [`AreaTable::load`].
    pub fn from_reader<R: Read>(reader: R, layout: &DataLayout) -> Result<Self, LoadError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = csv_reader.headers()?.clone();
        let index = HeaderIndex::resolve(&headers, layout)?;

        let mut records = Vec::new();
        let mut by_id = BTreeMap::new();

        for row in csv_reader.records() {
            let row = row?;
            let line = row.position().map_or(0, csv::Position::line);

            let area_id = row.get(index.id).unwrap_or_default().to_string();
            if area_id.is_empty() {
                return Err(LoadError::malformed(
                    ResourceKey::Areas,
                    format!("line {line}: empty '{}'", layout.id_column),
                ));
            }

            let name = index
                .name
                .and_then(|i| row.get(i))
                .filter(|n| !n.is_empty())
                .unwrap_or(&area_id)
                .to_string();

            let mut baseline = FeatureRecord::new();
            for (i, column) in index.features.iter().chain(&index.auxiliary) {
                if let Some(value) = parse_cell(&row, *i, column, line)? {
                    baseline.insert(column, value);
                } else {
                    log::debug!("Area {area_id} has no value for '{column}'");
                }
            }

            let housing_stress_index = parse_cell(&row, index.target, &layout.target_column, line)?;

            let centroid = match index.centroid {
                Some((lat_i, lng_i)) => {
                    let latitude = parse_cell(&row, lat_i, &layout.latitude_column, line)?;
                    let longitude = parse_cell(&row, lng_i, &layout.longitude_column, line)?;
                    latitude
                        .zip(longitude)
                        .map(|(latitude, longitude)| Centroid {
                            latitude,
                            longitude,
                        })
                }
                None => None,
            };

            if by_id.insert(area_id.clone(), records.len()).is_some() {
                return Err(LoadError::DuplicateArea { area_id });
            }

            records.push(AreaRecord {
                area_id,
                name,
                centroid,
                baseline,
                housing_stress_index,
            });
        }

        Ok(Self {
            records,
            by_id,
            feature_columns: index.features.into_iter().map(|(_, c)| c).collect(),
        })
    }

    /// Looks up an area by identifier.
    #[must_use]
    pub fn get(&self, area_id: &str) -> Option<&AreaRecord> {
        self.by_id.get(area_id).map(|&i| &self.records[i])
    }

    /// Looks up an area by identifier, then by case-insensitive name.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<&AreaRecord> {
        let key = key.trim();
        self.get(key).or_else(|| {
            self.records
                .iter()
                .find(|r| r.name.eq_ignore_ascii_case(key))
        })
    }

    /// All records in dataset order.
    #[must_use]
    pub fn records(&self) -> &[AreaRecord] {
        &self.records
    }

    /// Feature columns in dataset order (identifier, name, centroid, target,
    /// excluded, and auxiliary columns removed).
    #[must_use]
    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    /// Number of areas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parses a finite numeric cell; blank cells yield `None`.
fn parse_cell(
    row: &csv::StringRecord,
    index: usize,
    column: &str,
    line: u64,
) -> Result<Option<f64>, LoadError> {
    let raw = row.get(index).unwrap_or_default();
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(LoadError::malformed(
            ResourceKey::Areas,
            format!("line {line}: '{column}' value '{raw}' is not a finite number"),
        )),
    }
}
