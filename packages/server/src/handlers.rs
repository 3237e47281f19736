//! HTTP handler functions for the taxi demand API.

use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, NaiveTime};
use taxi_demand::DemandError;
use taxi_demand::service::DemandRequest;
use taxi_demand_server_models::{
    ApiForecast, ApiHealth, ApiRegion, ForecastQueryParams,
};

use crate::AppState;

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_version: state.model_version.clone(),
    })
}

/// `GET /api/forecast`
///
/// Runs one demand query from a randomly sampled location.
pub async fn forecast(
    state: web::Data<AppState>,
    params: web::Query<ForecastQueryParams>,
) -> HttpResponse {
    let date = match params.date.as_deref().map(parse_date) {
        Some(Some(date)) => Some(date),
        Some(None) => return bad_request("date must be YYYY-MM-DD"),
        None => None,
    };
    let time = match params.time.as_deref().map(parse_time) {
        Some(Some(time)) => Some(time),
        Some(None) => return bad_request("time must be HH:MM or HH:MM:SS"),
        None => None,
    };

    let request = DemandRequest {
        date,
        time,
        scope: params.scope.unwrap_or_default(),
    };

    match state.service.forecast(&request) {
        Ok(forecast) => HttpResponse::Ok().json(ApiForecast::from(forecast)),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/regions`
///
/// Lists every known region with its map color.
pub async fn regions(state: web::Data<AppState>) -> HttpResponse {
    let regions: Vec<ApiRegion> = state
        .service
        .colors()
        .entries()
        .map(|(region, color)| ApiRegion {
            region,
            color: color.to_string(),
        })
        .collect();

    HttpResponse::Ok().json(regions)
}

/// Maps a query failure to an HTTP response.
fn error_response(e: &DemandError) -> HttpResponse {
    match e {
        DemandError::InvalidInput { .. } => bad_request(&e.to_string()),
        DemandError::BucketNotFound { .. } => {
            HttpResponse::NotFound().json(serde_json::json!({
                "error": "No data for the selected date & time"
            }))
        }
        _ => {
            log::error!("Forecast failed: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to compute forecast"
            }))
        }
    }
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({ "error": message }))
}

/// Parses `YYYY-MM-DD`.
fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Parses `HH:MM:SS` or `HH:MM`.
fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}
