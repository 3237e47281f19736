#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the taxi demand server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the pipeline types to allow independent evolution of the API
//! contract.

use serde::{Deserialize, Serialize};
use taxi_demand_models::{
    DemandForecast, GeoPoint, LegendEntry, MapPoint, MapScope, RegionId, ZoneSelection,
};

/// Query parameters for the forecast endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastQueryParams {
    /// Date as `YYYY-MM-DD`. Defaults to the configured default date.
    pub date: Option<String>,
    /// Time as `HH:MM` or `HH:MM:SS`.
    pub time: Option<String>,
    /// `complete` or `neighborhood`. Defaults to `neighborhood`.
    pub scope: Option<MapScope>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is ready.
    pub healthy: bool,
    /// Server version.
    pub version: String,
    /// Registry version of the served model, if it was resolved at
    /// startup.
    pub model_version: Option<String>,
}

/// One legend line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLegendEntry {
    /// Region id.
    pub region: RegionId,
    /// Predicted pickups, truncated.
    pub demand: i64,
    /// Hex color.
    pub color: String,
    /// Display text, `Region {id} - Demand: {n}`.
    pub label: String,
}

impl From<LegendEntry> for ApiLegendEntry {
    fn from(entry: LegendEntry) -> Self {
        let label = entry.to_string();
        Self {
            region: entry.region,
            demand: entry.demand,
            color: entry.color,
            label,
        }
    }
}

/// Map drawing instructions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMap {
    /// View center.
    pub center: GeoPoint,
    /// Dot radius.
    pub radius: f64,
    /// Dots to draw.
    pub points: Vec<MapPoint>,
}

/// Forecast response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiForecast {
    /// Bucket the predictions are for, `YYYY-MM-DD HH:MM:SS`.
    pub prediction_time: String,
    /// Sampled current location.
    pub location: GeoPoint,
    /// Region of the sampled location.
    pub location_region: RegionId,
    /// Scope the query ran with.
    pub scope: MapScope,
    /// Selected regions; `None` means the whole city.
    pub regions: Option<Vec<RegionId>>,
    /// Legend lines, ascending by region.
    pub legend: Vec<ApiLegendEntry>,
    /// Map directive.
    pub map: ApiMap,
}

impl From<DemandForecast> for ApiForecast {
    fn from(forecast: DemandForecast) -> Self {
        Self {
            prediction_time: forecast.prediction_time.to_string(),
            location: forecast.location.point(),
            location_region: forecast.location.region,
            scope: forecast.scope,
            regions: match forecast.selection {
                ZoneSelection::All => None,
                ZoneSelection::Nearest(regions) => Some(regions),
            },
            legend: forecast.legend.into_iter().map(Into::into).collect(),
            map: ApiMap {
                center: forecast.map.center,
                radius: forecast.map.radius,
                points: forecast.map.points,
            },
        }
    }
}

/// A region and its color.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRegion {
    /// Region id.
    pub region: RegionId,
    /// Hex color.
    pub color: String,
}
