//! Water index computation.
//!
//! Fetches a scene collection through the imagery engine, reduces it to
//! one index raster and clips the raster to the requested area. Optical
//! indices are normalized band differences averaged over the least-cloudy
//! scenes; the radar index is speckle-filtered VH backscatter in dB,
//! averaged over time and resampled to the analysis resolution.

use std::cmp::Ordering;

use ndarray::{Array2, Zip};

use crate::core::reduce;
use crate::core::speckle::{SpeckleFilter, SpeckleFilterParams, SpeckleFilterType};
use crate::engine::{ImageryEngine, OpticalQuery, OpticalScene, RadarQuery};
use crate::types::{
    AreaOfInterest, DateRange, Grid, HydroError, HydroResult, Pixel, Raster, WaterIndex,
    WaterSource,
};

/// Index computation parameters
#[derive(Debug, Clone, Copy)]
pub struct IndexParams {
    /// Cap on optical scenes entering the temporal mean; the least-cloudy
    /// scenes win.
    pub max_scenes: usize,
    /// Cloud-cover ceiling (percent, exclusive) for optical scenes
    pub max_cloud_pct: f32,
    /// Speckle filter radius for radar backscatter, in pixels
    pub speckle_radius: usize,
    /// Grid resolution the radar index is resampled to, in meters
    pub radar_resolution_m: f64,
}

impl Default for IndexParams {
    fn default() -> Self {
        IndexParams {
            max_scenes: 10,
            max_cloud_pct: 10.0,
            speckle_radius: 3,
            radar_resolution_m: 30.0,
        }
    }
}

/// Compute the time-averaged `kind` index over `area` for `range`,
/// clipped to the area geometry.
pub fn compute_index(
    engine: &dyn ImageryEngine,
    area: &AreaOfInterest,
    range: DateRange,
    kind: WaterIndex,
    params: &IndexParams,
) -> HydroResult<Raster> {
    if params.max_scenes == 0 {
        return Err(HydroError::Processing(
            "scene cap must be at least 1".to_string(),
        ));
    }
    match kind.source() {
        WaterSource::Optical => optical_index(engine, area, range, kind, params),
        WaterSource::Radar => radar_index(engine, area, range, params),
    }
}

fn optical_index(
    engine: &dyn ImageryEngine,
    area: &AreaOfInterest,
    range: DateRange,
    kind: WaterIndex,
    params: &IndexParams,
) -> HydroResult<Raster> {
    let query = OpticalQuery {
        bounds: area.bounding_box(),
        range,
        max_cloud_pct: params.max_cloud_pct,
    };
    let mut scenes = engine.optical_scenes(&query)?;
    if scenes.is_empty() {
        return Err(HydroError::NoImageryFound {
            source: WaterSource::Optical,
            start: range.start(),
            end: range.end(),
        });
    }

    // Least-cloudy scenes first; acquisition date and id break ties so
    // the cap selects the same scenes on every run.
    scenes.sort_by(|a, b| {
        a.cloud_cover_pct
            .partial_cmp(&b.cloud_cover_pct)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.acquired.cmp(&b.acquired))
            .then_with(|| a.id.cmp(&b.id))
    });
    scenes.truncate(params.max_scenes);
    log::info!("computing {} from {} optical scene(s)", kind, scenes.len());

    let template = scenes[0].green.clone();
    let mut stack = Vec::with_capacity(scenes.len());
    for scene in &scenes {
        let second = second_band(scene, kind)?;
        if !scene.green.same_grid(&template) || !second.same_grid(&template) {
            return Err(HydroError::ExternalService(format!(
                "scene {} is not on the shared pixel grid",
                scene.id
            )));
        }
        stack.push(normalized_difference(scene.green.data(), second.data()));
    }

    let mean = temporal_mean(&stack);
    let raster = Raster::new(kind.name(), *template.transform(), mean);
    Ok(reduce::clip(&raster, &area.to_polygon()))
}

fn second_band(scene: &OpticalScene, kind: WaterIndex) -> HydroResult<&Raster> {
    match kind {
        WaterIndex::Ndwi => Ok(&scene.nir),
        WaterIndex::Mndwi => Ok(&scene.swir),
        WaterIndex::Vh => Err(HydroError::InvalidSource(format!(
            "{} is not an optical index",
            kind
        ))),
    }
}

fn radar_index(
    engine: &dyn ImageryEngine,
    area: &AreaOfInterest,
    range: DateRange,
    params: &IndexParams,
) -> HydroResult<Raster> {
    let query = RadarQuery::water_detection(area.bounding_box(), range);
    let scenes = engine.radar_scenes(&query)?;
    if scenes.is_empty() {
        return Err(HydroError::NoImageryFound {
            source: WaterSource::Radar,
            start: range.start(),
            end: range.end(),
        });
    }
    log::info!("computing VH from {} radar scene(s)", scenes.len());

    let filter = SpeckleFilter::with_params(SpeckleFilterParams {
        radius: params.speckle_radius,
    });
    let template = scenes[0].vh.clone();
    let mut stack = Vec::with_capacity(scenes.len());
    for scene in &scenes {
        if !scene.vh.same_grid(&template) {
            return Err(HydroError::ExternalService(format!(
                "scene {} is not on the shared pixel grid",
                scene.id
            )));
        }
        let db = to_decibels(scene.vh.data());
        stack.push(filter.apply(&db, SpeckleFilterType::Mean)?);
    }

    let mean = temporal_mean(&stack);
    let raster = Raster::new(WaterIndex::Vh.name(), *template.transform(), mean);
    let resampled = engine.resample(&raster, params.radar_resolution_m)?;
    Ok(reduce::clip(&resampled, &area.to_polygon()))
}

/// Normalized difference (a - b) / (a + b) with nodata guards: any
/// non-finite input pixel, or a vanishing denominator, yields NaN.
pub fn normalized_difference(a: &Grid, b: &Grid) -> Grid {
    Zip::from(a).and(b).map_collect(|&x, &y| {
        if !x.is_finite() || !y.is_finite() {
            return Pixel::NAN;
        }
        let sum = x + y;
        if sum.abs() < 1e-10 {
            Pixel::NAN
        } else {
            (x - y) / sum
        }
    })
}

/// Linear backscatter to dB. Non-positive power has no logarithm; such
/// pixels become NaN and drop out of later reductions.
pub fn to_decibels(linear: &Grid) -> Grid {
    linear.mapv(|v| {
        if v > 0.0 {
            10.0 * v.log10()
        } else {
            Pixel::NAN
        }
    })
}

/// Per-pixel mean across a stack of co-registered grids, ignoring NaN.
/// Pixels with no valid observation stay NaN.
fn temporal_mean(stack: &[Grid]) -> Grid {
    let dim = stack[0].dim();
    let mut sum = Array2::<f64>::zeros(dim);
    let mut count = Array2::<u32>::zeros(dim);
    for grid in stack {
        for ((r, c), &v) in grid.indexed_iter() {
            if v.is_finite() {
                sum[[r, c]] += v as f64;
                count[[r, c]] += 1;
            }
        }
    }
    Array2::from_shape_fn(dim, |(r, c)| {
        if count[[r, c]] > 0 {
            (sum[[r, c]] / count[[r, c]] as f64) as Pixel
        } else {
            Pixel::NAN
        }
    })
}
