//! One demand query, end to end.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use rand::Rng;
use taxi_demand_models::{DemandForecast, MapScope, ReferencePoint, ZoneSelection};

use crate::colors::RegionColorMap;
use crate::pipeline::PredictionPipeline;
use crate::reference::ReferenceLocations;
use crate::store::{DemandFeatureStore, filter_by_regions};
use crate::zones::{DEFAULT_NEIGHBOR_COUNT, ZoneSelector};
use crate::{DemandError, bucket, legend};

/// Tunables that shape every query.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySettings {
    /// How many nearby regions a neighbourhood query covers.
    pub neighbor_count: usize,
    /// Earliest selectable date, inclusive.
    pub min_date: Option<NaiveDate>,
    /// Latest selectable date, inclusive.
    pub max_date: Option<NaiveDate>,
    /// Date used when a request leaves it out.
    pub default_date: Option<NaiveDate>,
    /// Radius of the dots drawn on the map.
    pub map_radius: f64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            neighbor_count: DEFAULT_NEIGHBOR_COUNT,
            min_date: None,
            max_date: None,
            default_date: None,
            map_radius: 0.01,
        }
    }
}

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DemandRequest {
    /// Selected date.
    pub date: Option<NaiveDate>,
    /// Selected wall-clock time.
    pub time: Option<NaiveTime>,
    /// Whole city or just the neighbourhood.
    pub scope: MapScope,
}

/// Answers demand queries against artifacts loaded once at startup.
#[derive(Debug, Clone)]
pub struct DemandService {
    store: Arc<DemandFeatureStore>,
    pipeline: PredictionPipeline,
    zones: ZoneSelector,
    locations: Arc<ReferenceLocations>,
    colors: Arc<RegionColorMap>,
    settings: QuerySettings,
}

impl DemandService {
    /// Wires the pipeline stages together.
    ///
    /// # Errors
    ///
    /// Returns [`DemandError::InvalidFeatureSet`] if the store was loaded
    /// with a different schema than the pipeline expects.
    pub fn new(
        store: Arc<DemandFeatureStore>,
        pipeline: PredictionPipeline,
        zones: ZoneSelector,
        locations: Arc<ReferenceLocations>,
        settings: QuerySettings,
    ) -> Result<Self, DemandError> {
        if store.schema() != pipeline.schema() {
            return Err(DemandError::InvalidFeatureSet {
                message: format!(
                    "feature table uses schema v{}, pipeline expects v{}",
                    store.schema().version,
                    pipeline.schema().version
                ),
            });
        }

        let colors = Arc::new(RegionColorMap::new(locations.regions()));

        Ok(Self {
            store,
            pipeline,
            zones,
            locations,
            colors,
            settings,
        })
    }

    /// The region color map shared by every query.
    #[must_use]
    pub fn colors(&self) -> &RegionColorMap {
        &self.colors
    }

    /// The settings the service was built with.
    #[must_use]
    pub const fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// The underlying feature table.
    #[must_use]
    pub fn store(&self) -> &DemandFeatureStore {
        &self.store
    }

    /// Runs a query from a randomly sampled reference location.
    ///
    /// # Errors
    ///
    /// See [`Self::forecast_at`]. Also returns
    /// [`DemandError::InvalidInput`] if there are no reference locations to
    /// sample from.
    pub fn forecast(&self, request: &DemandRequest) -> Result<DemandForecast, DemandError> {
        self.forecast_with_rng(request, &mut rand::thread_rng())
    }

    /// Like [`Self::forecast`] with a caller-supplied random source.
    ///
    /// # Errors
    ///
    /// See [`Self::forecast`].
    pub fn forecast_with_rng<R: Rng + ?Sized>(
        &self,
        request: &DemandRequest,
        rng: &mut R,
    ) -> Result<DemandForecast, DemandError> {
        let location = self
            .locations
            .sample(rng)
            .ok_or_else(|| DemandError::InvalidInput {
                field: "reference location".to_string(),
            })?;
        self.forecast_at(request, location)
    }

    /// Runs a query as seen from `location`.
    ///
    /// # Errors
    ///
    /// - [`DemandError::InvalidInput`] if the time is missing, the date is
    ///   missing with no default configured, or the date is outside the
    ///   configured range.
    /// - [`DemandError::BucketNotFound`] if there is no data for the bucket.
    /// - [`DemandError::ModelNotLoaded`] / [`DemandError::Model`] if zone
    ///   selection or inference fails.
    /// - [`DemandError::InvariantViolation`] on an internal mismatch.
    pub fn forecast_at(
        &self,
        request: &DemandRequest,
        location: ReferencePoint,
    ) -> Result<DemandForecast, DemandError> {
        let date = request.date.or(self.settings.default_date);
        let prediction_time = bucket::bucket(date, request.time)?;
        self.check_date_range(date)?;

        let selection = match request.scope {
            MapScope::Complete => ZoneSelection::All,
            MapScope::Neighborhood => self
                .zones
                .select(location.point(), Some(self.settings.neighbor_count))?,
        };

        let frame = filter_by_regions(self.store.lookup(prediction_time)?, &selection);
        let input = self.pipeline.drop_labels(&frame);

        let predictions = if input.is_empty() {
            Vec::new()
        } else {
            self.pipeline.predict(&input)?
        };

        let legend = legend::render(&input, &predictions, &self.colors)?;
        let map = self.locations.map_directive(
            &selection,
            &self.colors,
            self.settings.map_radius,
            location.point(),
        );

        log::info!(
            "Forecast for {prediction_time} ({} scope): {} regions",
            request.scope,
            legend.len()
        );

        Ok(DemandForecast {
            prediction_time,
            location,
            scope: request.scope,
            selection,
            legend,
            map,
        })
    }

    fn check_date_range(&self, date: Option<NaiveDate>) -> Result<(), DemandError> {
        let Some(date) = date else {
            return Ok(());
        };
        let too_early = self.settings.min_date.is_some_and(|min| date < min);
        let too_late = self.settings.max_date.is_some_and(|max| date > max);
        if too_early || too_late {
            return Err(DemandError::InvalidInput {
                field: format!("date {date} is outside the available range"),
            });
        }
        Ok(())
    }
}
