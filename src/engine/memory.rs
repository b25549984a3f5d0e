//! In-memory imagery backend.
//!
//! Serves scenes out of a fixed catalog, applying the same query filters
//! a remote catalog would. This is the backend the test suite and local
//! experiments run against.

use ndarray::Array2;

use crate::types::{span_pixels, GeoTransform, HydroError, HydroResult, Pixel, Raster};

use super::{ImageryEngine, OpticalQuery, OpticalScene, RadarQuery, RadarScene};

/// Equatorial meters per degree of longitude; good enough for the
/// resolution bookkeeping the pipeline does.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Fixed-catalog imagery engine
#[derive(Debug, Default)]
pub struct MemoryEngine {
    optical: Vec<OpticalScene>,
    radar: Vec<RadarScene>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_optical(mut self, scene: OpticalScene) -> Self {
        self.optical.push(scene);
        self
    }

    pub fn with_radar(mut self, scene: RadarScene) -> Self {
        self.radar.push(scene);
        self
    }
}

impl ImageryEngine for MemoryEngine {
    fn optical_scenes(&self, query: &OpticalQuery) -> HydroResult<Vec<OpticalScene>> {
        let scenes: Vec<OpticalScene> = self
            .optical
            .iter()
            .filter(|scene| {
                query.range.contains(scene.acquired)
                    && scene.cloud_cover_pct < query.max_cloud_pct
                    && scene.extent().intersects(&query.bounds)
            })
            .cloned()
            .collect();
        log::debug!(
            "optical query matched {} of {} catalog scene(s)",
            scenes.len(),
            self.optical.len()
        );
        Ok(scenes)
    }

    fn radar_scenes(&self, query: &RadarQuery) -> HydroResult<Vec<RadarScene>> {
        let scenes: Vec<RadarScene> = self
            .radar
            .iter()
            .filter(|scene| {
                query.range.contains(scene.acquired)
                    && scene.polarizations.contains(&query.polarization)
                    && scene.mode == query.mode
                    && query.orbit.map_or(true, |orbit| scene.orbit == orbit)
                    && scene.extent().intersects(&query.bounds)
            })
            .cloned()
            .collect();
        log::debug!(
            "radar query matched {} of {} catalog scene(s)",
            scenes.len(),
            self.radar.len()
        );
        Ok(scenes)
    }

    /// Nearest-neighbor resampling onto a north-up grid at the requested
    /// resolution. Output pixels whose centers fall outside the source
    /// extent become NaN.
    fn resample(&self, raster: &Raster, resolution_m: f64) -> HydroResult<Raster> {
        if !(resolution_m > 0.0) {
            return Err(HydroError::Processing(format!(
                "resample resolution must be positive, got {} m",
                resolution_m
            )));
        }
        let pixel_size = resolution_m / METERS_PER_DEGREE;
        let extent = raster.extent();
        let rows = span_pixels(extent.height(), pixel_size);
        let cols = span_pixels(extent.width(), pixel_size);
        let out_transform = GeoTransform::north_up(extent.min_lon, extent.max_lat, pixel_size);

        let src = raster.transform();
        let (src_rows, src_cols) = raster.shape();
        let data = Array2::from_shape_fn((rows, cols), |(r, c)| {
            let (lon, lat) = out_transform.pixel_center(r, c);
            let col = ((lon - src.top_left_x) / src.pixel_width).floor();
            let row = ((lat - src.top_left_y) / src.pixel_height).floor();
            if row >= 0.0 && col >= 0.0 && (row as usize) < src_rows && (col as usize) < src_cols {
                raster.data()[[row as usize, col as usize]]
            } else {
                Pixel::NAN
            }
        });
        log::debug!(
            "resampled {} from {:?} to {:?} at {} m",
            raster.band(),
            raster.shape(),
            (rows, cols),
            resolution_m
        );
        Ok(Raster::new(raster.band(), out_transform, data))
    }
}
