//! Mask vectorization and document assembly.
//!
//! Turns a binary water mask into GeoJSON polygons: connected regions of
//! equal mask value (4-connectivity, NaN excluded) become features whose
//! boundaries follow pixel edges exactly. Each feature is annotated with
//! its mask value and the mean of the source index over the region's own
//! pixels; the document carries request metadata and the area-wide water
//! coverage percentage.

use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use ndarray::Array2;
use serde_json::json;

use crate::core::coverage;
use crate::core::reduce::ReduceConfig;
use crate::types::{
    AreaOfInterest, DateRange, GeoTransform, HydroError, HydroResult, Pixel, Raster, WaterIndex,
};

/// Pixel-corner coordinate (x = column corner, y = row corner)
type Corner = (usize, usize);

struct Component {
    label: i32,
    value: Pixel,
    pixels: Vec<(usize, usize)>,
}

/// Build the annotated GeoJSON document for a mask and its source index.
/// Both rasters must share one pixel grid.
pub fn mask_to_feature_collection(
    mask: &Raster,
    index: &Raster,
    area: &AreaOfInterest,
    range: DateRange,
    kind: WaterIndex,
    config: &ReduceConfig,
) -> HydroResult<FeatureCollection> {
    if !mask.same_grid(index) {
        return Err(HydroError::Processing(format!(
            "mask grid {:?} does not match index grid {:?}",
            mask.shape(),
            index.shape()
        )));
    }

    let (labels, components) = label_components(mask);
    log::debug!(
        "vectorizing {} component(s) from {}",
        components.len(),
        mask.band()
    );

    let mut features = Vec::with_capacity(components.len());
    for comp in &components {
        let rings = component_rings(&labels, comp, mask.transform());
        let mut properties = JsonObject::new();
        properties.insert("value".to_string(), json!(comp.value as i64));
        let mean = component_mean(index, &comp.pixels);
        properties.insert(
            kind.mean_property(),
            match mean {
                Some(m) => json!(m),
                None => serde_json::Value::Null,
            },
        );
        features.push(Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::Polygon(rings))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }

    let water_coverage = coverage::water_coverage(mask, area, config);
    let mut meta = JsonObject::new();
    meta.insert("index_name".to_string(), json!(kind.name()));
    meta.insert("start_date".to_string(), json!(range.start().to_string()));
    meta.insert("end_date".to_string(), json!(range.end().to_string()));
    meta.insert("coordinates".to_string(), json!(area.coordinates()));
    meta.insert("water_coverage".to_string(), json!(water_coverage));
    let mut foreign = JsonObject::new();
    foreign.insert("properties".to_string(), serde_json::Value::Object(meta));

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(foreign),
    })
}

/// Label 4-connected regions of equal mask value. NaN pixels belong to no
/// region. Components come back in row-major discovery order.
fn label_components(mask: &Raster) -> (Array2<i32>, Vec<Component>) {
    let (rows, cols) = mask.shape();
    let data = mask.data();
    let mut labels = Array2::from_elem((rows, cols), -1i32);
    let mut components = Vec::new();

    for r in 0..rows {
        for c in 0..cols {
            if data[[r, c]].is_nan() || labels[[r, c]] >= 0 {
                continue;
            }
            let label = components.len() as i32;
            let value = data[[r, c]];
            let mut pixels = Vec::new();
            let mut queue = VecDeque::new();
            labels[[r, c]] = label;
            queue.push_back((r, c));
            while let Some((pr, pc)) = queue.pop_front() {
                pixels.push((pr, pc));
                let candidates = [
                    (pr.wrapping_sub(1), pc),
                    (pr + 1, pc),
                    (pr, pc.wrapping_sub(1)),
                    (pr, pc + 1),
                ];
                for (nr, nc) in candidates {
                    if nr < rows
                        && nc < cols
                        && labels[[nr, nc]] < 0
                        && data[[nr, nc]] == value
                    {
                        labels[[nr, nc]] = label;
                        queue.push_back((nr, nc));
                    }
                }
            }
            components.push(Component {
                label,
                value,
                pixels,
            });
        }
    }
    (labels, components)
}

/// Geographic rings of one component, exterior ring first
fn component_rings(
    labels: &Array2<i32>,
    comp: &Component,
    transform: &GeoTransform,
) -> Vec<Vec<Vec<f64>>> {
    let edges = boundary_edges(labels, comp.label, &comp.pixels);
    let mut rings: Vec<(f64, Vec<Corner>)> = stitch_rings(edges)
        .into_iter()
        .map(|ring| (signed_area(&ring), ring))
        .collect();
    // The exterior encloses every hole, so it has the largest magnitude
    rings.sort_by(|a, b| {
        b.0.abs()
            .partial_cmp(&a.0.abs())
            .unwrap_or(Ordering::Equal)
    });
    rings
        .into_iter()
        .map(|(_, ring)| ring_coordinates(&ring, transform))
        .collect()
}

/// Directed boundary edges of a component, keyed by start corner. Each
/// edge keeps the component's interior on its left, so exterior rings
/// come out counter-clockwise geographically and holes clockwise, per
/// GeoJSON's right-hand rule.
fn boundary_edges(
    labels: &Array2<i32>,
    label: i32,
    pixels: &[(usize, usize)],
) -> BTreeMap<Corner, Vec<Corner>> {
    let (rows, cols) = labels.dim();
    let in_comp = |r: isize, c: isize| {
        r >= 0
            && c >= 0
            && (r as usize) < rows
            && (c as usize) < cols
            && labels[[r as usize, c as usize]] == label
    };

    let mut edges: BTreeMap<Corner, Vec<Corner>> = BTreeMap::new();
    for &(r, c) in pixels {
        let (ri, ci) = (r as isize, c as isize);
        if !in_comp(ri - 1, ci) {
            edges.entry((c + 1, r)).or_default().push((c, r));
        }
        if !in_comp(ri, ci + 1) {
            edges.entry((c + 1, r + 1)).or_default().push((c + 1, r));
        }
        if !in_comp(ri + 1, ci) {
            edges.entry((c, r + 1)).or_default().push((c + 1, r + 1));
        }
        if !in_comp(ri, ci - 1) {
            edges.entry((c, r)).or_default().push((c, r + 1));
        }
    }
    edges
}

/// Stitch directed edges into closed rings. Every corner has balanced
/// in- and out-degree, so each walk returns to its start.
fn stitch_rings(mut edges: BTreeMap<Corner, Vec<Corner>>) -> Vec<Vec<Corner>> {
    let mut rings = Vec::new();
    while let Some((&start, _)) = edges.iter().next() {
        let mut ring = vec![start];
        let mut current = start;
        let mut direction: Option<(isize, isize)> = None;
        loop {
            let Some(outs) = edges.get_mut(&current) else {
                break;
            };
            let next = match (outs.len(), direction) {
                (1, _) | (_, None) => outs[0],
                // Pinch corner: the sharpest turn toward the interior
                // keeps the ring on its own side, so rings touch without
                // crossing
                (_, Some(dir)) => {
                    let mut best = outs[0];
                    let mut best_rank = u8::MAX;
                    for &cand in outs.iter() {
                        let d = (
                            cand.0 as isize - current.0 as isize,
                            cand.1 as isize - current.1 as isize,
                        );
                        let rank = turn_rank(dir, d);
                        if rank < best_rank {
                            best_rank = rank;
                            best = cand;
                        }
                    }
                    best
                }
            };
            if let Some(pos) = outs.iter().position(|&e| e == next) {
                outs.swap_remove(pos);
            }
            if outs.is_empty() {
                edges.remove(&current);
            }
            direction = Some((
                next.0 as isize - current.0 as isize,
                next.1 as isize - current.1 as isize,
            ));
            current = next;
            if current == start {
                break;
            }
            ring.push(current);
        }
        rings.push(ring);
    }
    rings
}

/// Turn preference in pixel coordinates (x east, y south). The interior
/// sits on the walk's left, so prefer left, then straight, then right.
fn turn_rank(incoming: (isize, isize), outgoing: (isize, isize)) -> u8 {
    let left = (incoming.1, -incoming.0);
    let right = (-incoming.1, incoming.0);
    if outgoing == left {
        0
    } else if outgoing == incoming {
        1
    } else if outgoing == right {
        2
    } else {
        3
    }
}

/// Shoelace area in pixel corner space. Sign separates exterior rings
/// from holes; magnitude picks the exterior among them.
fn signed_area(ring: &[Corner]) -> f64 {
    let n = ring.len();
    let mut sum = 0.0;
    for i in 0..n {
        let (x1, y1) = ring[i];
        let (x2, y2) = ring[(i + 1) % n];
        sum += x1 as f64 * y2 as f64 - x2 as f64 * y1 as f64;
    }
    sum / 2.0
}

/// Drop vertices in the middle of straight runs, then map corners to
/// lon/lat and close the ring.
fn ring_coordinates(ring: &[Corner], transform: &GeoTransform) -> Vec<Vec<f64>> {
    let n = ring.len();
    let mut coords: Vec<Vec<f64>> = Vec::new();
    for i in 0..n {
        let prev = ring[(i + n - 1) % n];
        let cur = ring[i];
        let next = ring[(i + 1) % n];
        let straight = (prev.0 == cur.0 && cur.0 == next.0) || (prev.1 == cur.1 && cur.1 == next.1);
        if !straight {
            let (lon, lat) = transform.corner(cur.1, cur.0);
            coords.push(vec![lon, lat]);
        }
    }
    if let Some(first) = coords.first().cloned() {
        coords.push(first);
    }
    coords
}

/// Mean of the index over exactly the component's pixels
fn component_mean(index: &Raster, pixels: &[(usize, usize)]) -> Option<f64> {
    let data = index.data();
    let mut sum = 0.0f64;
    let mut count = 0u64;
    for &(r, c) in pixels {
        let v = data[[r, c]];
        if v.is_finite() {
            sum += v as f64;
            count += 1;
        }
    }
    if count > 0 {
        Some(sum / count as f64)
    } else {
        None
    }
}
