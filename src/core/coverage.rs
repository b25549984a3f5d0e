//! Water coverage statistics.

use crate::core::reduce::{self, ReduceConfig};
use crate::types::{AreaOfInterest, Raster};

/// Percentage of `region` covered by water according to a binary mask.
///
/// The mean of mask values over the region is the water fraction; scaled
/// to [0, 100]. A region with no valid mask pixels reports 0: no
/// observation means no detected water, not a failure.
pub fn water_coverage(mask: &Raster, region: &AreaOfInterest, config: &ReduceConfig) -> f64 {
    match reduce::region_mean(mask, &region.to_polygon(), config) {
        Some(fraction) => (fraction * 100.0).clamp(0.0, 100.0),
        None => 0.0,
    }
}
