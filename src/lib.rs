//! hydromask: surface-water mask derivation from satellite imagery
//!
//! Turns Sentinel-2 optical indices (NDWI, MNDWI) or Sentinel-1 VH
//! backscatter into binary water masks, vectorized GeoJSON features with
//! per-region index means, and area-wide coverage statistics. Large
//! areas can be tiled into fixed-size grid cells processed independently
//! and merged into one document.
//!
//! Imagery comes through the [`engine::ImageryEngine`] seam; the
//! in-memory [`engine::MemoryEngine`] backs tests and local runs, and a
//! remote catalog client can implement the same trait.

pub mod core;
pub mod engine;
pub mod io;
pub mod service;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    AcquisitionMode, AreaOfInterest, BoundingBox, DateRange, GeoTransform, HydroError,
    HydroResult, OrbitPass, Polarization, Raster, WaterIndex, WaterIndexRequest, WaterSource,
};

pub use engine::{ImageryEngine, MemoryEngine};
pub use service::{ErrorEnvelope, ServiceConfig, WaterMaskService};
