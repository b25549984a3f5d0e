//! Core water-index processing modules

pub mod coverage;
pub mod grid;
pub mod index;
pub mod mask;
pub mod reduce;
pub mod speckle;
pub mod vectorize;

// Re-export main types
pub use coverage::water_coverage;
pub use grid::{generate_cells, process_grid, DroppedCell, GridOutcome, GridParams};
pub use index::{compute_index, normalized_difference, to_decibels, IndexParams};
pub use mask::water_mask;
pub use reduce::{clip, region_mean, ReduceConfig};
pub use speckle::{SpeckleFilter, SpeckleFilterParams, SpeckleFilterType};
pub use vectorize::mask_to_feature_collection;
