#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Data types shared by the taxi demand query pipeline.
//!
//! A query flows through these types left to right: a [`TimeBucket`] keys
//! into a table of [`FeatureRow`]s, a [`ZoneSelection`] narrows the rows to
//! the regions of interest, and the predictions come back out as
//! [`LegendEntry`]s plus a [`MapDirective`] for whatever draws the map.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Integer identifier of a fixed geographic zone.
///
/// Region ids are shared by the feature table, the spatial cluster model
/// (cluster `i` is region `i`) and the reference-location dataset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct RegionId(pub i64);

impl RegionId {
    /// Returns the raw integer id.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl From<i64> for RegionId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A timestamp used as the exact-match key into the feature table.
///
/// Once computed a bucket is never adjusted: lookups compare it verbatim
/// against the timestamps stored in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeBucket(NaiveDateTime);

impl TimeBucket {
    /// Wraps a timestamp as a bucket key.
    #[must_use]
    pub const fn new(at: NaiveDateTime) -> Self {
        Self(at)
    }

    /// Returns the underlying timestamp.
    #[must_use]
    pub const fn as_datetime(&self) -> NaiveDateTime {
        self.0
    }
}

impl From<NaiveDateTime> for TimeBucket {
    fn from(at: NaiveDateTime) -> Self {
        Self(at)
    }
}

impl std::fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl GeoPoint {
    /// Creates a point from latitude and longitude.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns `[longitude, latitude]`, the column order the scaler and the
    /// cluster model were fitted on.
    #[must_use]
    pub const fn lon_lat(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// Versioned description of the columns the feature table must carry.
///
/// Checked once when the table is loaded so that a mismatched dataset fails
/// at startup instead of feeding the wrong columns into the regressor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FeatureSchema {
    /// Schema version, bumped whenever the column set changes.
    pub version: u32,
    /// Name of the timestamp column that holds the bucket key.
    pub timestamp_column: String,
    /// Name of the column holding the region id. Must also be listed in
    /// `categorical`.
    pub region_column: String,
    /// Columns the encoder one-hot encodes.
    pub categorical: Vec<String>,
    /// Columns passed to the regressor unchanged.
    pub numeric: Vec<String>,
    /// Historical target columns. Kept for display, never fed to the model.
    pub labels: Vec<String>,
}

impl FeatureSchema {
    /// Iterates over every column the encoder requires, categorical first.
    pub fn required_columns(&self) -> impl Iterator<Item = &str> {
        self.categorical
            .iter()
            .chain(self.numeric.iter())
            .map(String::as_str)
    }

    /// Whether `column` is one of the label columns.
    #[must_use]
    pub fn is_label(&self, column: &str) -> bool {
        self.labels.iter().any(|l| l == column)
    }

    /// Whether `column` is known to the schema (required or label).
    #[must_use]
    pub fn is_known(&self, column: &str) -> bool {
        self.is_label(column) || self.required_columns().any(|c| c == column)
    }
}

/// One record of the feature table: a region's explanatory variables for a
/// single time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRow {
    /// Region this row describes.
    pub region: RegionId,
    /// Column values, aligned with [`FeatureFrame::columns`].
    pub values: Vec<f64>,
}

/// The rows of one time bucket together with their column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFrame {
    /// Bucket every row belongs to.
    pub bucket: TimeBucket,
    /// Column names, in value order.
    pub columns: Vec<String>,
    /// Rows in table order.
    pub rows: Vec<FeatureRow>,
}

impl FeatureFrame {
    /// Creates a frame.
    #[must_use]
    pub const fn new(bucket: TimeBucket, columns: Vec<String>, rows: Vec<FeatureRow>) -> Self {
        Self {
            bucket,
            columns,
            rows,
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the frame has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `column` within [`Self::columns`].
    #[must_use]
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Value of `column` in row `row`, if both exist.
    #[must_use]
    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.values.get(idx).copied()
    }

    /// Region ids in row order.
    pub fn regions(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.rows.iter().map(|r| r.region)
    }

    /// Returns a copy of the frame without the named columns.
    #[must_use]
    pub fn without_columns(&self, drop: &[String]) -> Self {
        let keep: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !drop.contains(c))
            .map(|(i, _)| i)
            .collect();

        Self {
            bucket: self.bucket,
            columns: keep.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| FeatureRow {
                    region: row.region,
                    values: keep.iter().filter_map(|&i| row.values.get(i).copied()).collect(),
                })
                .collect(),
        }
    }
}

/// The set of regions a query is restricted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "regions")]
pub enum ZoneSelection {
    /// Every region. Never enumerated.
    All,
    /// The nearest regions, closest first.
    Nearest(Vec<RegionId>),
}

impl ZoneSelection {
    /// Whether `region` is part of the selection.
    #[must_use]
    pub fn contains(&self, region: RegionId) -> bool {
        match self {
            Self::All => true,
            Self::Nearest(regions) => regions.contains(&region),
        }
    }

    /// Whether this is the "all regions" sentinel.
    #[must_use]
    pub const fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

/// Which part of the city a query covers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MapScope {
    /// Every region in the city.
    Complete,
    /// Only the regions nearest to the sampled location.
    #[default]
    Neighborhood,
}

/// A sampled pickup location from the reference dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    /// Pickup longitude.
    #[serde(rename = "pickup_longitude")]
    pub longitude: f64,
    /// Pickup latitude.
    #[serde(rename = "pickup_latitude")]
    pub latitude: f64,
    /// Region the pickup belongs to.
    pub region: RegionId,
}

impl ReferencePoint {
    /// The location as a [`GeoPoint`].
    #[must_use]
    pub const fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// One line of the rendered legend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegendEntry {
    /// Region id.
    pub region: RegionId,
    /// Predicted pickups, truncated toward zero.
    pub demand: i64,
    /// Hex color assigned to the region.
    pub color: String,
}

impl std::fmt::Display for LegendEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Region {} - Demand: {}", self.region, self.demand)
    }
}

/// A colored dot on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPoint {
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
    /// Region the point belongs to.
    pub region: RegionId,
    /// Hex color of the region.
    pub color: String,
}

/// Everything a presentation layer needs to draw the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDirective {
    /// Where to center the view.
    pub center: GeoPoint,
    /// Dot radius in map units.
    pub radius: f64,
    /// Points to draw.
    pub points: Vec<MapPoint>,
}

/// The complete answer to one demand query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandForecast {
    /// The bucket the predictions are for.
    pub prediction_time: TimeBucket,
    /// The sampled "current location".
    pub location: ReferencePoint,
    /// Scope the query was run with.
    pub scope: MapScope,
    /// Regions selected for the query. `All` for the complete map.
    pub selection: ZoneSelection,
    /// Legend lines sorted by region id.
    pub legend: Vec<LegendEntry>,
    /// Map rendering directive.
    pub map: MapDirective,
}

/// Distinct region ids in `regions`, ascending.
#[must_use]
pub fn distinct_regions(regions: impl IntoIterator<Item = RegionId>) -> BTreeSet<RegionId> {
    regions.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bucket() -> TimeBucket {
        TimeBucket::new(
            NaiveDate::from_ymd_opt(2016, 3, 1)
                .unwrap()
                .and_hms_opt(0, 15, 0)
                .unwrap(),
        )
    }

    #[test]
    fn legend_entry_displays_as_legend_line() {
        let entry = LegendEntry {
            region: RegionId(12),
            demand: 37,
            color: "#FF0000".into(),
        };
        assert_eq!(entry.to_string(), "Region 12 - Demand: 37");
    }

    #[test]
    fn time_bucket_displays_like_a_timestamp() {
        assert_eq!(bucket().to_string(), "2016-03-01 00:15:00");
    }

    #[test]
    fn without_columns_keeps_alignment() {
        let frame = FeatureFrame::new(
            bucket(),
            vec!["region".into(), "lag_1".into(), "total_pickups".into()],
            vec![
                FeatureRow {
                    region: RegionId(3),
                    values: vec![3.0, 12.0, 40.0],
                },
                FeatureRow {
                    region: RegionId(1),
                    values: vec![1.0, 7.0, 22.0],
                },
            ],
        );

        let dropped = frame.without_columns(&["total_pickups".to_string()]);

        assert_eq!(dropped.columns, vec!["region", "lag_1"]);
        assert_eq!(dropped.rows[0].values, vec![3.0, 12.0]);
        assert_eq!(dropped.rows[1].values, vec![1.0, 7.0]);
        assert_eq!(dropped.value(1, "lag_1"), Some(7.0));
        assert_eq!(dropped.value(1, "total_pickups"), None);
    }

    #[test]
    fn all_selection_contains_everything() {
        assert!(ZoneSelection::All.contains(RegionId(9_999)));
        assert!(ZoneSelection::All.is_all());

        let nearest = ZoneSelection::Nearest(vec![RegionId(4), RegionId(2)]);
        assert!(nearest.contains(RegionId(2)));
        assert!(!nearest.contains(RegionId(3)));
        assert!(!nearest.is_all());
    }

    #[test]
    fn map_scope_parses_snake_case() {
        assert_eq!("complete".parse::<MapScope>().unwrap(), MapScope::Complete);
        assert_eq!(
            "neighborhood".parse::<MapScope>().unwrap(),
            MapScope::Neighborhood
        );
        assert!("nyc".parse::<MapScope>().is_err());
        assert_eq!(MapScope::default(), MapScope::Neighborhood);
    }

    #[test]
    fn schema_classifies_columns() {
        let schema = FeatureSchema {
            version: 1,
            timestamp_column: "tpep_pickup_datetime".into(),
            region_column: "region".into(),
            categorical: vec!["region".into(), "day_of_week".into()],
            numeric: vec!["lag_1".into()],
            labels: vec!["total_pickups".into()],
        };

        assert_eq!(
            schema.required_columns().collect::<Vec<_>>(),
            vec!["region", "day_of_week", "lag_1"]
        );
        assert!(schema.is_label("total_pickups"));
        assert!(!schema.is_label("region"));
        assert!(schema.is_known("lag_1"));
        assert!(!schema.is_known("tip_amount"));
    }

    #[test]
    fn reference_point_reads_pickup_columns() {
        let json = r#"{"pickup_longitude": -73.98, "pickup_latitude": 40.75, "region": 7}"#;
        let point: ReferencePoint = serde_json::from_str(json).unwrap();

        assert_eq!(point.region, RegionId(7));
        assert_eq!(point.point().lon_lat(), [-73.98, 40.75]);
    }
}
