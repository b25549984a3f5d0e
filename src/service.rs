//! The five water-mask operations the HTTP layer exposes.
//!
//! Single-mask operations (VH, NDWI, MNDWI) run the full pipeline over
//! the whole request area. Grid operations (NDWI, MNDWI) tile the area
//! first. Every operation takes the same wire request and returns a
//! GeoJSON FeatureCollection; failures map onto one error envelope.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};

use crate::core::grid::{self, GridParams};
use crate::core::index::{self, IndexParams};
use crate::core::mask;
use crate::core::reduce::ReduceConfig;
use crate::core::vectorize;
use crate::engine::ImageryEngine;
use crate::io;
use crate::types::{HydroError, HydroResult, WaterIndex, WaterIndexRequest};

/// Service-wide processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Cap on optical scenes per index computation
    pub max_scenes: usize,
    /// Cloud-cover ceiling (percent, exclusive) for optical scenes
    pub max_cloud_pct: f32,
    /// Speckle filter radius in pixels for the radar path
    pub speckle_radius: usize,
    /// Resolution the radar index is resampled to, in meters
    pub radar_resolution_m: f64,
    /// Ceiling on pixels visited per spatial reduction
    pub max_reduce_pixels: u64,
    /// Grid cell side length in degrees
    pub cell_size_degrees: f64,
    /// Optional wall-clock budget for a whole grid request
    pub grid_deadline: Option<Duration>,
    /// When set, every result document is also written here as
    /// `<operation>.geojson`
    pub output_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            max_scenes: 10,
            max_cloud_pct: 10.0,
            speckle_radius: 3,
            radar_resolution_m: 30.0,
            max_reduce_pixels: 1_000_000_000,
            cell_size_degrees: 0.1,
            grid_deadline: None,
            output_dir: None,
        }
    }
}

impl ServiceConfig {
    fn index_params(&self) -> IndexParams {
        IndexParams {
            max_scenes: self.max_scenes,
            max_cloud_pct: self.max_cloud_pct,
            speckle_radius: self.speckle_radius,
            radar_resolution_m: self.radar_resolution_m,
        }
    }

    fn reduce_config(&self) -> ReduceConfig {
        ReduceConfig {
            max_pixels: self.max_reduce_pixels,
        }
    }

    fn grid_params(&self) -> GridParams {
        GridParams {
            cell_size_degrees: self.cell_size_degrees,
            deadline: self.grid_deadline,
            index: self.index_params(),
            reduce: self.reduce_config(),
        }
    }
}

/// Uniform failure body returned to callers alongside an HTTP 500
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub status: u16,
    pub message: String,
}

impl From<HydroError> for ErrorEnvelope {
    fn from(err: HydroError) -> Self {
        ErrorEnvelope {
            status: 500,
            message: err.to_string(),
        }
    }
}

/// Water-mask operations over a shared imagery engine.
///
/// The engine handle is the only state shared across requests; it is
/// created once and used concurrently by grid workers, so it sits
/// behind an `Arc`.
pub struct WaterMaskService {
    engine: Arc<dyn ImageryEngine>,
    config: ServiceConfig,
}

impl WaterMaskService {
    pub fn new(engine: Arc<dyn ImageryEngine>, config: ServiceConfig) -> Self {
        WaterMaskService { engine, config }
    }

    /// VH backscatter water mask over the whole request area
    pub fn vh_mask(&self, request: &WaterIndexRequest) -> HydroResult<FeatureCollection> {
        self.single_mask(request, WaterIndex::Vh)
    }

    /// NDWI water mask over the whole request area
    pub fn ndwi_mask(&self, request: &WaterIndexRequest) -> HydroResult<FeatureCollection> {
        self.single_mask(request, WaterIndex::Ndwi)
    }

    /// MNDWI water mask over the whole request area
    pub fn mndwi_mask(&self, request: &WaterIndexRequest) -> HydroResult<FeatureCollection> {
        self.single_mask(request, WaterIndex::Mndwi)
    }

    /// Grid-tiled NDWI coverage over the request area
    pub fn grid_ndwi(&self, request: &WaterIndexRequest) -> HydroResult<FeatureCollection> {
        self.grid(request, WaterIndex::Ndwi)
    }

    /// Grid-tiled MNDWI coverage over the request area
    pub fn grid_mndwi(&self, request: &WaterIndexRequest) -> HydroResult<FeatureCollection> {
        self.grid(request, WaterIndex::Mndwi)
    }

    fn single_mask(
        &self,
        request: &WaterIndexRequest,
        kind: WaterIndex,
    ) -> HydroResult<FeatureCollection> {
        log::info!(
            "{} mask request: {} ring point(s), {} to {}",
            kind,
            request.coordinates.len(),
            request.start_date,
            request.end_date
        );
        let area = request.area()?;
        let range = request.date_range()?;
        let threshold = request.threshold(kind);

        let index_raster =
            index::compute_index(self.engine.as_ref(), &area, range, kind, &self.config.index_params())?;
        let water_mask = mask::water_mask(&index_raster, kind, threshold);
        let collection = vectorize::mask_to_feature_collection(
            &water_mask,
            &index_raster,
            &area,
            range,
            kind,
            &self.config.reduce_config(),
        )?;
        log::info!(
            "{} mask complete: {} feature(s)",
            kind,
            collection.features.len()
        );
        self.persist(&collection, &format!("{}_water_mask", kind.name().to_lowercase()));
        Ok(collection)
    }

    fn grid(
        &self,
        request: &WaterIndexRequest,
        kind: WaterIndex,
    ) -> HydroResult<FeatureCollection> {
        log::info!(
            "grid {} request: {} ring point(s), {} to {}",
            kind,
            request.coordinates.len(),
            request.start_date,
            request.end_date
        );
        let area = request.area()?;
        let range = request.date_range()?;
        let threshold = request.threshold(kind);

        let outcome = grid::process_grid(
            self.engine.as_ref(),
            &area,
            range,
            kind,
            threshold,
            &self.config.grid_params(),
        )?;
        if !outcome.dropped.is_empty() {
            log::warn!(
                "grid {} dropped {} of {} cell(s)",
                kind,
                outcome.dropped.len(),
                outcome.dropped.len() + outcome.collection.features.len()
            );
        }
        self.persist(
            &outcome.collection,
            &format!("grid_{}", kind.name().to_lowercase()),
        );
        Ok(outcome.collection)
    }

    /// Best-effort document persistence; failures are logged, never
    /// surfaced to the caller.
    fn persist(&self, collection: &FeatureCollection, name: &str) {
        let Some(dir) = &self.config.output_dir else {
            return;
        };
        let path = dir.join(format!("{}.geojson", name));
        if let Err(err) = io::save_feature_collection(collection, &path) {
            log::warn!("could not persist {}: {}", path.display(), err);
        }
    }
}
