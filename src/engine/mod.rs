//! Imagery engine seam.
//!
//! Every pipeline stage that needs satellite data goes through the
//! [`ImageryEngine`] trait rather than a concrete catalog client, so the
//! processing code stays testable against the in-memory backend and a
//! remote catalog can be dropped in behind the same calls.

use chrono::NaiveDate;

use crate::types::{
    AcquisitionMode, BoundingBox, DateRange, HydroResult, OrbitPass, Polarization, Raster,
};

pub mod memory;

pub use memory::MemoryEngine;

/// Query for cloud-screened Sentinel-2 scenes
#[derive(Debug, Clone)]
pub struct OpticalQuery {
    pub bounds: BoundingBox,
    pub range: DateRange,
    /// Scenes at or above this cloud percentage are excluded
    pub max_cloud_pct: f32,
}

/// Query for Sentinel-1 scenes
#[derive(Debug, Clone)]
pub struct RadarQuery {
    pub bounds: BoundingBox,
    pub range: DateRange,
    pub polarization: Polarization,
    pub mode: AcquisitionMode,
    /// None accepts either orbit direction
    pub orbit: Option<OrbitPass>,
}

impl RadarQuery {
    /// The acquisition geometry water detection uses: VH polarization,
    /// IW mode, descending passes only.
    pub fn water_detection(bounds: BoundingBox, range: DateRange) -> Self {
        RadarQuery {
            bounds,
            range,
            polarization: Polarization::VH,
            mode: AcquisitionMode::IW,
            orbit: Some(OrbitPass::Descending),
        }
    }
}

/// One Sentinel-2 acquisition carrying the bands the water indices read:
/// green (B3), NIR (B8) and SWIR (B11), all on one pixel grid.
#[derive(Debug, Clone)]
pub struct OpticalScene {
    pub id: String,
    pub acquired: NaiveDate,
    pub cloud_cover_pct: f32,
    pub green: Raster,
    pub nir: Raster,
    pub swir: Raster,
}

impl OpticalScene {
    /// Spatial footprint, taken from the green band
    pub fn extent(&self) -> BoundingBox {
        self.green.extent()
    }
}

/// One Sentinel-1 acquisition with its VH band in linear backscatter
#[derive(Debug, Clone)]
pub struct RadarScene {
    pub id: String,
    pub acquired: NaiveDate,
    pub mode: AcquisitionMode,
    pub orbit: OrbitPass,
    /// Polarizations the acquisition was transmitted/received with
    pub polarizations: Vec<Polarization>,
    pub vh: Raster,
}

impl RadarScene {
    pub fn extent(&self) -> BoundingBox {
        self.vh.extent()
    }
}

/// Blocking access to a satellite imagery catalog.
///
/// Implementations return fully materialized scenes; all index math,
/// masking and vectorization downstream is eager and in-memory.
pub trait ImageryEngine: Send + Sync {
    /// Sentinel-2 scenes intersecting the query bounds within the date
    /// range, below the cloud ceiling. Empty result is not an error here;
    /// the index computation decides what an empty collection means.
    fn optical_scenes(&self, query: &OpticalQuery) -> HydroResult<Vec<OpticalScene>>;

    /// Sentinel-1 scenes matching the query's acquisition geometry
    fn radar_scenes(&self, query: &RadarQuery) -> HydroResult<Vec<RadarScene>>;

    /// Resample a raster onto a grid with `resolution_m` meter pixels,
    /// keeping its geographic extent.
    fn resample(&self, raster: &Raster, resolution_m: f64) -> HydroResult<Raster>;
}
