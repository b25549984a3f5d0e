use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use geojson::FeatureCollection;
use serde_json::json;
use tempfile::TempDir;

use hydromask::core::{process_grid, GridParams};
use hydromask::engine::{MemoryEngine, OpticalScene};
use hydromask::types::{BoundingBox, Raster};
use hydromask::{HydroError, ServiceConfig, WaterIndex, WaterIndexRequest, WaterMaskService};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Sentinel-2 scene over `bounds`, water (NDWI 0.5) west of `split` and
/// land (NDWI -0.5) east of it.
fn split_scene(bounds: BoundingBox, split: f64) -> OpticalScene {
    let water = move |lon: f64| lon < split;
    OpticalScene {
        id: "S2A_20230615".to_string(),
        acquired: NaiveDate::from_ymd_opt(2023, 6, 15).unwrap(),
        cloud_cover_pct: 2.0,
        green: Raster::from_fn("B3", bounds, 0.01, |lon, _| if water(lon) { 0.6 } else { 0.2 }),
        nir: Raster::from_fn("B8", bounds, 0.01, |lon, _| if water(lon) { 0.2 } else { 0.6 }),
        swir: Raster::from_fn("B11", bounds, 0.01, |lon, _| if water(lon) { 0.2 } else { 0.6 }),
    }
}

fn square_request() -> WaterIndexRequest {
    WaterIndexRequest {
        coordinates: vec![
            [10.0, 10.0],
            [10.2, 10.0],
            [10.2, 10.2],
            [10.0, 10.2],
            [10.0, 10.0],
        ],
        start_date: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2023, 6, 30).unwrap(),
        vh_threshold: 1.25,
        ndwi_threshold: 0.0,
        mndwi_threshold: 0.0,
    }
}

fn square_bounds() -> BoundingBox {
    BoundingBox {
        min_lon: 10.0,
        max_lon: 10.2,
        min_lat: 10.0,
        max_lat: 10.2,
    }
}

fn metadata(collection: &FeatureCollection) -> &serde_json::Map<String, serde_json::Value> {
    collection
        .foreign_members
        .as_ref()
        .and_then(|m| m.get("properties"))
        .and_then(|v| v.as_object())
        .expect("document should carry a metadata block")
}

fn cell_ring(feature: &geojson::Feature) -> &Vec<Vec<f64>> {
    match &feature.geometry.as_ref().expect("cell geometry").value {
        geojson::Value::Polygon(rings) => &rings[0],
        other => panic!("expected polygon cell, got {:?}", other),
    }
}

#[test]
fn test_grid_tiles_square_area_into_four_cells() {
    init_logging();

    let engine = MemoryEngine::new().with_optical(split_scene(square_bounds(), 10.1));
    let service = WaterMaskService::new(Arc::new(engine), ServiceConfig::default());

    let collection = service
        .grid_ndwi(&square_request())
        .expect("grid NDWI should succeed");

    assert_eq!(collection.features.len(), 4);

    // Cells come southwest-first, longitude in the outer loop. The two
    // western cells sit wholly in the water half.
    let expected = [
        ([10.0, 10.0], 100.0, 0.5),
        ([10.0, 10.1], 100.0, 0.5),
        ([10.1, 10.0], 0.0, -0.5),
        ([10.1, 10.1], 0.0, -0.5),
    ];
    for (feature, (origin, coverage, mean)) in collection.features.iter().zip(expected) {
        let ring = cell_ring(feature);
        assert_eq!(ring.len(), 5, "cells are closed rectangles");
        assert_eq!(ring[0], origin.to_vec());

        let props = feature.properties.as_ref().expect("cell properties");
        assert_eq!(props["water_index"], json!("NDWI"));
        assert_eq!(props["start_date"], json!("2023-06-01"));
        assert_eq!(props["end_date"], json!("2023-06-30"));
        let got_coverage = props["water_coverage"].as_f64().expect("coverage");
        assert!(
            (got_coverage - coverage).abs() < 1e-6,
            "cell at {:?}: want {}% water, got {}%",
            origin,
            coverage,
            got_coverage
        );
        let got_mean = props["ndwi_mean"].as_f64().expect("cell mean");
        assert!(
            (got_mean - mean).abs() < 1e-6,
            "cell at {:?}: want mean {}, got {}",
            origin,
            mean,
            got_mean
        );
    }

    let meta = metadata(&collection);
    assert_eq!(meta["water_index"], json!("NDWI"));
    assert_eq!(meta["total_cells"], json!(4));
    assert_eq!(meta["cell_size_degrees"], json!(0.1));
    assert_eq!(meta["coordinates"].as_array().map(Vec::len), Some(5));
}

#[test]
fn test_grid_cell_overhangs_east_edge() {
    init_logging();

    // 0.25 degrees of longitude do not divide into 0.1 degree cells; the
    // third cell starts inside the bound and overhangs to 10.3.
    let bounds = BoundingBox {
        min_lon: 10.0,
        max_lon: 10.25,
        min_lat: 10.0,
        max_lat: 10.1,
    };
    let engine = MemoryEngine::new().with_optical(split_scene(bounds, 11.0));
    let service = WaterMaskService::new(Arc::new(engine), ServiceConfig::default());
    let request = WaterIndexRequest {
        coordinates: vec![
            [10.0, 10.0],
            [10.25, 10.0],
            [10.25, 10.1],
            [10.0, 10.1],
            [10.0, 10.0],
        ],
        ..square_request()
    };

    let collection = service
        .grid_ndwi(&request)
        .expect("grid NDWI should succeed");

    assert_eq!(collection.features.len(), 3);
    assert_eq!(metadata(&collection)["total_cells"], json!(3));

    let last = cell_ring(&collection.features[2]);
    assert!((last[0][0] - 10.2).abs() < 1e-9, "third cell origin");
    assert!(
        (last[1][0] - 10.3).abs() < 1e-9,
        "third cell overhangs the area bound"
    );

    // The overhanging cell still reports on the imagery it does have.
    for feature in &collection.features {
        let coverage = feature.properties.as_ref().expect("properties")["water_coverage"]
            .as_f64()
            .expect("coverage");
        assert!(
            (coverage - 100.0).abs() < 1e-6,
            "every valid pixel is water, got {}%",
            coverage
        );
    }
}

#[test]
fn test_grid_failed_cells_are_dropped_not_fatal() {
    init_logging();

    // Imagery stops short of longitude 10.1, so the two eastern cells
    // find no scenes at all.
    let west = BoundingBox {
        min_lon: 10.0,
        max_lon: 10.09,
        min_lat: 10.0,
        max_lat: 10.2,
    };
    let engine = MemoryEngine::new().with_optical(split_scene(west, 11.0));
    let request = square_request();
    let area = request.area().expect("valid ring");
    let range = request.date_range().expect("valid dates");

    let outcome = process_grid(
        &engine,
        &area,
        range,
        WaterIndex::Ndwi,
        0.0,
        &GridParams::default(),
    )
    .expect("grid should survive failing cells");

    assert_eq!(outcome.collection.features.len(), 2);
    assert_eq!(outcome.dropped.len(), 2);
    assert_eq!(outcome.dropped[0].cell, 2);
    assert_eq!(outcome.dropped[1].cell, 3);
    for dropped in &outcome.dropped {
        assert!(matches!(dropped.error, HydroError::CellProcessing { .. }));
        assert!(
            dropped.error.to_string().contains("imagery"),
            "cell failure should surface the cause: {}",
            dropped.error
        );
    }

    // Through the service the document simply reports fewer cells.
    let service = WaterMaskService::new(Arc::new(engine), ServiceConfig::default());
    let collection = service
        .grid_ndwi(&request)
        .expect("grid NDWI should succeed");
    assert_eq!(collection.features.len(), 2);
    assert_eq!(metadata(&collection)["total_cells"], json!(2));
}

#[test]
fn test_grid_empty_catalog_produces_empty_document() {
    init_logging();

    // One-cell area whose sole cell finds no imagery at all.
    let request = WaterIndexRequest {
        coordinates: vec![
            [10.0, 10.0],
            [10.1, 10.0],
            [10.1, 10.1],
            [10.0, 10.1],
            [10.0, 10.0],
        ],
        ..square_request()
    };
    let service = WaterMaskService::new(Arc::new(MemoryEngine::new()), ServiceConfig::default());
    let collection = service
        .grid_ndwi(&request)
        .expect("an empty grid is not an error");

    assert!(collection.features.is_empty());
    let meta = metadata(&collection);
    assert_eq!(meta["total_cells"], json!(0));
    assert_eq!(meta["water_index"], json!("NDWI"));
}

#[test]
fn test_grid_zero_deadline_drops_every_cell() {
    init_logging();

    let engine = MemoryEngine::new().with_optical(split_scene(square_bounds(), 10.1));
    let request = square_request();
    let area = request.area().expect("valid ring");
    let range = request.date_range().expect("valid dates");
    let params = GridParams {
        deadline: Some(Duration::ZERO),
        ..GridParams::default()
    };

    let outcome = process_grid(&engine, &area, range, WaterIndex::Ndwi, 0.0, &params)
        .expect("an exhausted budget is not an error");

    assert!(outcome.collection.features.is_empty());
    assert_eq!(outcome.dropped.len(), 4);
    assert!(
        outcome.dropped[0].error.to_string().contains("deadline"),
        "drop reason: {}",
        outcome.dropped[0].error
    );
}

#[test]
fn test_grid_output_is_deterministic() {
    init_logging();

    let engine = Arc::new(MemoryEngine::new().with_optical(split_scene(square_bounds(), 10.1)));
    let service = WaterMaskService::new(engine, ServiceConfig::default());
    let request = square_request();

    let first = service.grid_ndwi(&request).expect("first run");
    let second = service.grid_ndwi(&request).expect("second run");

    let first = serde_json::to_value(&first).expect("serializable");
    let second = serde_json::to_value(&second).expect("serializable");
    assert_eq!(first, second, "cell order and values must not vary");
}

#[test]
fn test_grid_document_round_trips_through_disk() {
    init_logging();

    let temp_dir = TempDir::new().expect("temp dir");
    let config = ServiceConfig {
        output_dir: Some(temp_dir.path().to_path_buf()),
        ..ServiceConfig::default()
    };
    let engine = MemoryEngine::new().with_optical(split_scene(square_bounds(), 10.1));
    let service = WaterMaskService::new(Arc::new(engine), config);

    let returned = service
        .grid_mndwi(&square_request())
        .expect("grid MNDWI should succeed");

    let path = temp_dir.path().join("grid_mndwi.geojson");
    let text = std::fs::read_to_string(&path).expect("persisted document");
    let parsed: FeatureCollection = serde_json::from_str(&text).expect("valid GeoJSON");
    assert_eq!(
        serde_json::to_value(&parsed).expect("serializable"),
        serde_json::to_value(&returned).expect("serializable"),
        "what lands on disk is exactly what the caller got"
    );
}
