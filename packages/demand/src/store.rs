//! Read-only, time-indexed table of per-region feature rows.
//!
//! The table is loaded once from a CSV export of the feature-engineering
//! job. Every column is checked against the [`FeatureSchema`] at load time:
//! required columns must be present and unknown columns are rejected, so a
//! dataset built for a different model version never reaches the encoder.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use taxi_demand_models::{FeatureFrame, FeatureRow, FeatureSchema, RegionId, TimeBucket, ZoneSelection};

use crate::DemandError;

/// Timestamp layouts accepted in the timestamp column.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Feature rows grouped by bucket, each bucket sorted by region.
#[derive(Debug, Clone)]
pub struct DemandFeatureStore {
    schema: FeatureSchema,
    columns: Vec<String>,
    buckets: BTreeMap<TimeBucket, Vec<FeatureRow>>,
}

impl DemandFeatureStore {
    /// Loads the table from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`DemandError::Dataset`] if the file cannot be read or a
    /// value fails to parse, or [`DemandError::InvalidFeatureSet`] if the
    /// header does not match `schema`.
    pub fn from_path(path: &Path, schema: FeatureSchema) -> Result<Self, DemandError> {
        let file = File::open(path).map_err(|e| dataset_error(path, e))?;
        Self::from_reader(file, schema, path)
    }

    /// Loads the table from CSV data. `source` is only used in errors and
    /// logs.
    ///
    /// # Errors
    ///
    /// See [`Self::from_path`].
    pub fn from_reader<R: Read>(
        reader: R,
        schema: FeatureSchema,
        source: &Path,
    ) -> Result<Self, DemandError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| dataset_error(source, e))?
            .iter()
            .map(str::to_owned)
            .collect();

        let timestamp_idx = headers
            .iter()
            .position(|h| *h == schema.timestamp_column)
            .ok_or_else(|| DemandError::InvalidFeatureSet {
                message: format!("missing timestamp column '{}'", schema.timestamp_column),
            })?;

        let feature_headers: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != timestamp_idx)
            .map(|(_, h)| h.clone())
            .collect();
        let columns = resolve_columns(&schema, &feature_headers)?;

        let positions: Vec<usize> = columns
            .iter()
            .map(|c| headers.iter().position(|h| h == c).unwrap_or(timestamp_idx))
            .collect();
        let region_idx = region_position(&schema, &columns)?;

        let mut entries = Vec::new();

        for result in reader.records() {
            let record = result.map_err(|e| dataset_error(source, e))?;
            let line = record.position().map_or(0, csv::Position::line);

            let raw_ts = record.get(timestamp_idx).unwrap_or_default();
            let bucket = parse_timestamp(raw_ts).ok_or_else(|| DemandError::Dataset {
                path: source.to_path_buf(),
                message: format!("line {line}: invalid timestamp '{raw_ts}'"),
            })?;

            let values = positions
                .iter()
                .zip(&columns)
                .map(|(&pos, column)| {
                    let raw = record.get(pos).unwrap_or_default();
                    raw.parse::<f64>().map_err(|_| DemandError::Dataset {
                        path: source.to_path_buf(),
                        message: format!("line {line}: invalid value '{raw}' in column '{column}'"),
                    })
                })
                .collect::<Result<Vec<f64>, _>>()?;

            let region = region_from_value(values[region_idx]).ok_or_else(|| {
                DemandError::Dataset {
                    path: source.to_path_buf(),
                    message: format!(
                        "line {line}: region '{}' is not an integer",
                        values[region_idx]
                    ),
                }
            })?;

            entries.push((bucket, FeatureRow { region, values }));
        }

        let store = Self::assemble(schema, columns, entries);

        log::info!(
            "Loaded {} feature rows across {} time buckets from {}",
            store.row_count(),
            store.buckets.len(),
            source.display()
        );

        Ok(store)
    }

    /// Builds a store from rows already in memory. `columns` names the
    /// values of every row, in order.
    ///
    /// # Errors
    ///
    /// Returns [`DemandError::InvalidFeatureSet`] if `columns` does not
    /// match `schema`, or [`DemandError::InvariantViolation`] if a row has
    /// the wrong number of values.
    pub fn from_rows(
        schema: FeatureSchema,
        columns: &[String],
        rows: Vec<(TimeBucket, FeatureRow)>,
    ) -> Result<Self, DemandError> {
        let ordered = resolve_columns(&schema, columns)?;
        region_position(&schema, &ordered)?;

        let mapping: Vec<usize> = ordered
            .iter()
            .filter_map(|c| columns.iter().position(|x| x == c))
            .collect();

        let mut entries = Vec::with_capacity(rows.len());
        for (bucket, row) in rows {
            if row.values.len() != columns.len() {
                return Err(DemandError::InvariantViolation {
                    message: format!(
                        "row for region {} has {} values, expected {}",
                        row.region,
                        row.values.len(),
                        columns.len()
                    ),
                });
            }
            let values = mapping.iter().map(|&i| row.values[i]).collect();
            entries.push((
                bucket,
                FeatureRow {
                    region: row.region,
                    values,
                },
            ));
        }

        Ok(Self::assemble(schema, ordered, entries))
    }

    fn assemble(
        schema: FeatureSchema,
        columns: Vec<String>,
        entries: Vec<(TimeBucket, FeatureRow)>,
    ) -> Self {
        let mut buckets: BTreeMap<TimeBucket, Vec<FeatureRow>> = BTreeMap::new();
        for (bucket, row) in entries {
            buckets.entry(bucket).or_default().push(row);
        }
        for rows in buckets.values_mut() {
            rows.sort_by_key(|r| r.region);
        }

        Self {
            schema,
            columns,
            buckets,
        }
    }

    /// The schema the table was validated against.
    #[must_use]
    pub const fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Column names of every row, required columns first, then labels.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Total number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Earliest and latest bucket in the table.
    #[must_use]
    pub fn bucket_range(&self) -> Option<(TimeBucket, TimeBucket)> {
        let first = self.buckets.keys().next()?;
        let last = self.buckets.keys().next_back()?;
        Some((*first, *last))
    }

    /// Returns every row of `bucket`, sorted by region.
    ///
    /// The match is exact: there is no fallback to a neighbouring bucket.
    ///
    /// # Errors
    ///
    /// Returns [`DemandError::BucketNotFound`] if the table has no rows for
    /// `bucket`.
    pub fn lookup(&self, bucket: TimeBucket) -> Result<FeatureFrame, DemandError> {
        let rows = self
            .buckets
            .get(&bucket)
            .ok_or(DemandError::BucketNotFound { bucket })?;

        log::debug!("Bucket {bucket}: {} rows", rows.len());

        Ok(FeatureFrame::new(bucket, self.columns.clone(), rows.clone()))
    }
}

/// Keeps only the rows whose region is part of `selection`.
///
/// Never fails: a selection that matches nothing yields an empty frame.
#[must_use]
pub fn filter_by_regions(mut frame: FeatureFrame, selection: &ZoneSelection) -> FeatureFrame {
    if !selection.is_all() {
        frame.rows.retain(|row| selection.contains(row.region));
    }
    frame
}

/// Orders `present` into schema order, checking that every required column
/// is there and nothing unknown is.
fn resolve_columns(schema: &FeatureSchema, present: &[String]) -> Result<Vec<String>, DemandError> {
    if let Some(unknown) = present.iter().find(|c| !schema.is_known(c)) {
        return Err(DemandError::InvalidFeatureSet {
            message: format!(
                "unexpected column '{unknown}' for feature schema v{}",
                schema.version
            ),
        });
    }

    let mut columns = Vec::new();
    for required in schema.required_columns() {
        if !present.iter().any(|c| c == required) {
            return Err(DemandError::InvalidFeatureSet {
                message: format!(
                    "missing column '{required}' required by feature schema v{}",
                    schema.version
                ),
            });
        }
        columns.push(required.to_string());
    }

    columns.extend(
        schema
            .labels
            .iter()
            .filter(|l| present.contains(l))
            .cloned(),
    );

    Ok(columns)
}

fn region_position(schema: &FeatureSchema, columns: &[String]) -> Result<usize, DemandError> {
    if !schema.categorical.contains(&schema.region_column) {
        return Err(DemandError::InvalidFeatureSet {
            message: format!(
                "region column '{}' must be categorical",
                schema.region_column
            ),
        });
    }
    columns
        .iter()
        .position(|c| *c == schema.region_column)
        .ok_or_else(|| DemandError::InvalidFeatureSet {
            message: format!("missing region column '{}'", schema.region_column),
        })
}

fn parse_timestamp(raw: &str) -> Option<TimeBucket> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(TimeBucket::new)
}

#[allow(clippy::cast_possible_truncation)]
fn region_from_value(value: f64) -> Option<RegionId> {
    (value.is_finite() && value.fract() == 0.0).then(|| RegionId(value as i64))
}

fn dataset_error(path: &Path, err: impl std::fmt::Display) -> DemandError {
    DemandError::Dataset {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
