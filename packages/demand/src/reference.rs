//! Reference pickup locations and the map directive built from them.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use rand::Rng;
use rand::seq::SliceRandom as _;
use taxi_demand_models::{
    GeoPoint, MapDirective, MapPoint, ReferencePoint, RegionId, ZoneSelection,
};

use crate::DemandError;
use crate::colors::RegionColorMap;

/// Sampled `(pickup_longitude, pickup_latitude, region)` points.
///
/// Used to pick a representative "current location", to enumerate the
/// known regions, and as the dots drawn on the map.
#[derive(Debug, Clone, Default)]
pub struct ReferenceLocations {
    points: Vec<ReferencePoint>,
}

impl ReferenceLocations {
    /// Wraps points already in memory.
    #[must_use]
    pub const fn new(points: Vec<ReferencePoint>) -> Self {
        Self { points }
    }

    /// Reads the dataset from a CSV file with `pickup_longitude`,
    /// `pickup_latitude` and `region` columns in any order.
    ///
    /// # Errors
    ///
    /// Returns [`DemandError::Dataset`] if the file cannot be read or a row
    /// fails to parse.
    pub fn from_path(path: &Path) -> Result<Self, DemandError> {
        let file = File::open(path).map_err(|e| DemandError::Dataset {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_reader(file, path)
    }

    /// Reads the dataset from CSV data. `source` is only used in errors and
    /// logs.
    ///
    /// # Errors
    ///
    /// See [`Self::from_path`].
    pub fn from_reader<R: Read>(reader: R, source: &Path) -> Result<Self, DemandError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let points = reader
            .deserialize::<ReferencePoint>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DemandError::Dataset {
                path: source.to_path_buf(),
                message: e.to_string(),
            })?;

        log::info!(
            "Loaded {} reference locations from {}",
            points.len(),
            source.display()
        );

        Ok(Self { points })
    }

    /// All points.
    #[must_use]
    pub fn points(&self) -> &[ReferencePoint] {
        &self.points
    }

    /// Distinct region ids, ascending.
    #[must_use]
    pub fn regions(&self) -> BTreeSet<RegionId> {
        taxi_demand_models::distinct_regions(self.points.iter().map(|p| p.region))
    }

    /// Picks one point uniformly at random, or `None` if there are none.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<ReferencePoint> {
        self.points.choose(rng).copied()
    }

    /// Builds the map directive for the points inside `selection`.
    ///
    /// The view is centered on the mean of the drawn points, falling back
    /// to `fallback_center` when nothing is drawn.
    #[must_use]
    pub fn map_directive(
        &self,
        selection: &ZoneSelection,
        colors: &RegionColorMap,
        radius: f64,
        fallback_center: GeoPoint,
    ) -> MapDirective {
        let points: Vec<MapPoint> = self
            .points
            .iter()
            .filter(|p| selection.contains(p.region))
            .map(|p| MapPoint {
                latitude: p.latitude,
                longitude: p.longitude,
                region: p.region,
                color: colors.color(p.region).to_string(),
            })
            .collect();

        let center = mean_point(&points).unwrap_or(fallback_center);

        MapDirective {
            center,
            radius,
            points,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean_point(points: &[MapPoint]) -> Option<GeoPoint> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (lat, lon) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lon), p| (lat + p.latitude, lon + p.longitude));
    Some(GeoPoint::new(lat / n, lon / n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng as _;
    use rand::rngs::StdRng;

    const CSV: &str = "\
pickup_longitude,pickup_latitude,region
-73.99,40.75,1
-73.97,40.77,1
-73.95,40.70,2
-73.80,40.65,3
";

    fn locations() -> ReferenceLocations {
        ReferenceLocations::from_reader(CSV.as_bytes(), Path::new("plot_data.csv")).unwrap()
    }

    #[test]
    fn reads_columns_by_name() {
        let csv = "region,pickup_latitude,pickup_longitude\n4,40.7,-73.9\n";
        let locations = ReferenceLocations::from_reader(csv.as_bytes(), Path::new("x.csv")).unwrap();
        assert_eq!(
            locations.points()[0].point(),
            GeoPoint::new(40.7, -73.9)
        );
    }

    #[test]
    fn enumerates_distinct_regions() {
        assert_eq!(
            locations().regions().into_iter().collect::<Vec<_>>(),
            vec![RegionId(1), RegionId(2), RegionId(3)]
        );
    }

    #[test]
    fn sampling_is_reproducible_with_a_seed() {
        let locations = locations();
        let a = locations.sample(&mut StdRng::seed_from_u64(7)).unwrap();
        let b = locations.sample(&mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
        assert!(locations.points().contains(&a));

        assert!(
            ReferenceLocations::default()
                .sample(&mut StdRng::seed_from_u64(7))
                .is_none()
        );
    }

    #[test]
    fn map_directive_draws_selected_regions_only() {
        let locations = locations();
        let colors = RegionColorMap::new(locations.regions());
        let map = locations.map_directive(
            &ZoneSelection::Nearest(vec![RegionId(1)]),
            &colors,
            0.01,
            GeoPoint::new(0.0, 0.0),
        );

        assert_eq!(map.points.len(), 2);
        assert!(map.points.iter().all(|p| p.color == colors.color(RegionId(1))));
        assert!((map.center.latitude - 40.76).abs() < 1e-9);
        assert!((map.center.longitude + 73.98).abs() < 1e-9);
    }

    #[test]
    fn empty_map_falls_back_to_given_center() {
        let map = locations().map_directive(
            &ZoneSelection::Nearest(Vec::new()),
            &RegionColorMap::default(),
            0.01,
            GeoPoint::new(40.0, -74.0),
        );
        assert!(map.points.is_empty());
        assert_eq!(map.center, GeoPoint::new(40.0, -74.0));
    }

    #[test]
    fn malformed_rows_are_dataset_errors() {
        let csv = "pickup_longitude,pickup_latitude,region\nabc,40.7,1\n";
        assert!(matches!(
            ReferenceLocations::from_reader(csv.as_bytes(), Path::new("x.csv")),
            Err(DemandError::Dataset { .. })
        ));
    }
}
