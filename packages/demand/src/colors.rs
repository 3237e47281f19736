//! Stable region colors.

use std::collections::BTreeSet;

use taxi_demand_models::RegionId;

/// Palette the map and legend draw from.
pub const PALETTE: [&str; 30] = [
    "#FF0000", "#FF4500", "#FF8C00", "#FFD700", "#ADFF2F", "#32CD32", "#008000", "#006400",
    "#00FF00", "#7CFC00", "#00FA9A", "#00FFFF", "#40E0D0", "#4682B4", "#1E90FF", "#0000FF",
    "#0000CD", "#8A2BE2", "#9932CC", "#BA55D3", "#FF00FF", "#FF1493", "#C71585", "#FF6347",
    "#FFA07A", "#FFDAB9", "#FFE4B5", "#F5DEB3", "#EEE8AA", "#DAA520",
];

/// Assigns every region a color from [`PALETTE`].
///
/// The color depends on the region id alone (`id mod 30`), never on the
/// order regions were seen in, so it is the same across queries and across
/// restarts.
#[derive(Debug, Clone, Default)]
pub struct RegionColorMap {
    regions: BTreeSet<RegionId>,
}

impl RegionColorMap {
    /// Builds the map for the regions present in the reference dataset.
    #[must_use]
    pub fn new(regions: impl IntoIterator<Item = RegionId>) -> Self {
        Self {
            regions: regions.into_iter().collect(),
        }
    }

    /// Color for `region`. Defined for every id, known or not.
    #[must_use]
    pub fn color(&self, region: RegionId) -> &'static str {
        color_for(region)
    }

    /// Known regions with their colors, ascending by id.
    pub fn entries(&self) -> impl Iterator<Item = (RegionId, &'static str)> + '_ {
        self.regions.iter().map(|&r| (r, color_for(r)))
    }

    /// Number of known regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether no regions are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]
fn color_for(region: RegionId) -> &'static str {
    let idx = region.value().rem_euclid(PALETTE.len() as i64) as usize;
    PALETTE[idx]
}
