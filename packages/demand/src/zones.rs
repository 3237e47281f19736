//! Nearest-region selection.

use std::cmp::Ordering;
use std::sync::Arc;

use taxi_demand_model::{ClusterModel, Scaler};
use taxi_demand_models::{GeoPoint, RegionId, ZoneSelection};

use crate::DemandError;

/// Number of neighbouring regions shown on the neighbourhood map.
pub const DEFAULT_NEIGHBOR_COUNT: usize = 9;

/// Picks the regions closest to a point using the fitted scaler and
/// cluster model.
///
/// Both handles are optional so that a selector can exist before the
/// artifacts are loaded; asking it for nearest regions in that state is a
/// [`DemandError::ModelNotLoaded`].
#[derive(Clone, Default)]
pub struct ZoneSelector {
    scaler: Option<Arc<dyn Scaler>>,
    clusters: Option<Arc<dyn ClusterModel>>,
}

impl std::fmt::Debug for ZoneSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneSelector")
            .field("scaler", &self.scaler.is_some())
            .field(
                "clusters",
                &self.clusters.as_ref().map(|c| c.n_clusters()),
            )
            .finish()
    }
}

impl ZoneSelector {
    /// Creates a selector from loaded models.
    #[must_use]
    pub fn new(scaler: Arc<dyn Scaler>, clusters: Arc<dyn ClusterModel>) -> Self {
        Self {
            scaler: Some(scaler),
            clusters: Some(clusters),
        }
    }

    /// Creates a selector with whatever models are available.
    #[must_use]
    pub const fn from_parts(
        scaler: Option<Arc<dyn Scaler>>,
        clusters: Option<Arc<dyn ClusterModel>>,
    ) -> Self {
        Self { scaler, clusters }
    }

    /// Number of regions the cluster model knows about, if loaded.
    #[must_use]
    pub fn region_count(&self) -> Option<usize> {
        self.clusters.as_ref().map(|c| c.n_clusters())
    }

    /// Selects the `k` regions nearest to `point`, or every region when
    /// `k` is `None`.
    ///
    /// Regions are returned closest first; equal distances are broken by
    /// ascending region id. A `k` larger than the number of clusters is
    /// clamped.
    ///
    /// # Errors
    ///
    /// Returns [`DemandError::ModelNotLoaded`] if `k` is given and the
    /// scaler or cluster model is missing, or [`DemandError::Model`] if the
    /// models reject the point.
    pub fn select(&self, point: GeoPoint, k: Option<usize>) -> Result<ZoneSelection, DemandError> {
        let Some(k) = k else {
            return Ok(ZoneSelection::All);
        };

        let scaler = self
            .scaler
            .as_ref()
            .ok_or(DemandError::ModelNotLoaded { model: "scaler" })?;
        let clusters = self
            .clusters
            .as_ref()
            .ok_or(DemandError::ModelNotLoaded { model: "kmeans" })?;

        let scaled = scaler.transform(&point.lon_lat())?;
        let distances = clusters.distances(&scaled)?;

        if k > distances.len() {
            log::warn!(
                "Requested {k} nearest regions but the cluster model only has {}",
                distances.len()
            );
        }

        let nearest = nearest_indices(&distances, k)
            .into_iter()
            .map(|i| RegionId(i64::try_from(i).unwrap_or(i64::MAX)))
            .collect::<Vec<_>>();

        log::debug!("Nearest regions to {point:?}: {nearest:?}");

        Ok(ZoneSelection::Nearest(nearest))
    }
}

/// Indices of the `k` smallest distances, ascending by `(distance, index)`.
fn nearest_indices(distances: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..distances.len()).collect();
    order.sort_by(|&a, &b| match distances[a].total_cmp(&distances[b]) {
        Ordering::Equal => a.cmp(&b),
        other => other,
    });
    order.truncate(k);
    order
}
