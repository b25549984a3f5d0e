//! GeoJSON document persistence, for offline inspection of results.

use std::fs;
use std::path::Path;

use geojson::FeatureCollection;

use crate::types::HydroResult;

/// Write `collection` to `path` as pretty-printed GeoJSON, creating
/// parent directories as needed.
pub fn save_feature_collection(collection: &FeatureCollection, path: &Path) -> HydroResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(collection)?;
    fs::write(path, body)?;
    log::debug!("wrote GeoJSON document to {}", path.display());
    Ok(())
}
