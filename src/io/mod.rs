//! Result document output

pub mod geojson;

pub use self::geojson::save_feature_collection;
