//! Bounded spatial reductions over a raster region.
//!
//! The reducers visit pixels whose centers fall inside a polygon. A
//! ceiling on visited pixels keeps huge regions from scanning an
//! unbounded number of cells: past the ceiling the reduction degrades to
//! a uniformly strided sample instead of failing.

use geo::{BoundingRect, Contains};
use geo_types::{Point, Polygon};
use ndarray::Array2;

use crate::types::{Pixel, Raster};

/// Reduction limits
#[derive(Debug, Clone, Copy)]
pub struct ReduceConfig {
    /// Ceiling on pixels visited by one reduction
    pub max_pixels: u64,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        ReduceConfig {
            max_pixels: 1_000_000_000,
        }
    }
}

/// Pixel-index window of `region` within a raster, clamped to the grid.
/// Returns None when the region misses the raster entirely.
fn pixel_window(raster: &Raster, region: &Polygon<f64>) -> Option<(usize, usize, usize, usize)> {
    let rect = region.bounding_rect()?;
    let t = raster.transform();
    let (rows, cols) = raster.shape();

    // pixel_height is negative, so the north edge maps to the small row
    let r0 = ((rect.max().y - t.top_left_y) / t.pixel_height).floor().max(0.0) as usize;
    let r1 = (((rect.min().y - t.top_left_y) / t.pixel_height).ceil().max(0.0) as usize).min(rows);
    let c0 = ((rect.min().x - t.top_left_x) / t.pixel_width).floor().max(0.0) as usize;
    let c1 = (((rect.max().x - t.top_left_x) / t.pixel_width).ceil().max(0.0) as usize).min(cols);

    if r0 >= r1 || c0 >= c1 {
        return None;
    }
    Some((r0, r1, c0, c1))
}

/// Mean of valid pixels whose centers fall inside `region`.
///
/// Returns None when no valid pixel center lies inside the region. When
/// the candidate window exceeds `config.max_pixels`, rows and columns are
/// strided so at most the ceiling is visited; the result is then a
/// deterministic sampled mean rather than an exact one.
pub fn region_mean(raster: &Raster, region: &Polygon<f64>, config: &ReduceConfig) -> Option<f64> {
    let (r0, r1, c0, c1) = pixel_window(raster, region)?;
    let candidates = ((r1 - r0) as u64) * ((c1 - c0) as u64);
    let stride = if candidates > config.max_pixels {
        let s = ((candidates as f64 / config.max_pixels as f64).sqrt()).ceil() as usize;
        log::debug!(
            "region of {} candidate pixels exceeds ceiling {}, sampling with stride {}",
            candidates,
            config.max_pixels,
            s
        );
        s.max(1)
    } else {
        1
    };

    let t = raster.transform();
    let data = raster.data();
    let mut sum = 0.0f64;
    let mut count = 0u64;
    for r in (r0..r1).step_by(stride) {
        for c in (c0..c1).step_by(stride) {
            let value = data[[r, c]];
            if !value.is_finite() {
                continue;
            }
            let (lon, lat) = t.pixel_center(r, c);
            if region.contains(&Point::new(lon, lat)) {
                sum += value as f64;
                count += 1;
            }
        }
    }
    if count > 0 {
        Some(sum / count as f64)
    } else {
        None
    }
}

/// Mask every pixel whose center falls outside `region` to NaN. The
/// eager stand-in for clipping an image to a geometry.
pub fn clip(raster: &Raster, region: &Polygon<f64>) -> Raster {
    let t = *raster.transform();
    let data = raster.data();
    let clipped = Array2::from_shape_fn(raster.shape(), |(r, c)| {
        let (lon, lat) = t.pixel_center(r, c);
        if region.contains(&Point::new(lon, lat)) {
            data[[r, c]]
        } else {
            Pixel::NAN
        }
    });
    Raster::new(raster.band(), t, clipped)
}
