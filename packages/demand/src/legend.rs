//! Legend rendering.

use taxi_demand_models::{FeatureFrame, LegendEntry};

use crate::DemandError;
use crate::colors::RegionColorMap;
use crate::pipeline::truncate_demand;

/// Pairs every row with its prediction and color, sorted by region id.
///
/// Does not rely on `frame` already being sorted.
///
/// # Errors
///
/// Returns [`DemandError::InvariantViolation`] if `predictions` does not
/// have exactly one value per row.
pub fn render(
    frame: &FeatureFrame,
    predictions: &[f64],
    colors: &RegionColorMap,
) -> Result<Vec<LegendEntry>, DemandError> {
    if frame.len() != predictions.len() {
        return Err(DemandError::InvariantViolation {
            message: format!(
                "{} rows but {} predictions for bucket {}",
                frame.len(),
                predictions.len(),
                frame.bucket
            ),
        });
    }

    let mut entries: Vec<LegendEntry> = frame
        .regions()
        .zip(predictions)
        .map(|(region, &prediction)| LegendEntry {
            region,
            demand: truncate_demand(prediction),
            color: colors.color(region).to_string(),
        })
        .collect();

    entries.sort_by_key(|e| e.region);

    Ok(entries)
}
