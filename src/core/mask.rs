//! Binary water masks.

use crate::types::{Pixel, Raster, WaterIndex};

/// Threshold an index raster into a binary water mask: 1 where `kind`
/// calls the value water, 0 where it does not, NaN passed through.
/// Extent and georeferencing are preserved; the band becomes
/// `<KIND>_water_mask`.
pub fn water_mask(index: &Raster, kind: WaterIndex, threshold: Pixel) -> Raster {
    let data = index.data().mapv(|v| {
        if v.is_nan() {
            Pixel::NAN
        } else if kind.is_water(v, threshold) {
            1.0
        } else {
            0.0
        }
    });
    Raster::new(kind.mask_band(), *index.transform(), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, GeoTransform};
    use ndarray::array;

    fn raster(data: ndarray::Array2<f32>) -> Raster {
        Raster::new("NDWI", GeoTransform::north_up(0.0, 1.0, 0.1), data)
    }

    #[test]
    fn optical_mask_flags_values_above_threshold() {
        let index = raster(array![[0.4f32, 0.0, -0.2, f32::NAN]]);
        let mask = water_mask(&index, WaterIndex::Ndwi, 0.0);
        assert_eq!(mask.band(), "NDWI_water_mask");
        assert_eq!(mask.data()[[0, 0]], 1.0);
        assert_eq!(mask.data()[[0, 1]], 0.0); // threshold itself is land
        assert_eq!(mask.data()[[0, 2]], 0.0);
        assert!(mask.data()[[0, 3]].is_nan());
    }

    #[test]
    fn radar_mask_flags_values_below_threshold() {
        let index = raster(array![[-22.0f32, 1.25, 4.0]]);
        let mask = water_mask(&index, WaterIndex::Vh, 1.25);
        assert_eq!(mask.band(), "VH_water_mask");
        assert_eq!(mask.data()[[0, 0]], 1.0);
        assert_eq!(mask.data()[[0, 1]], 0.0); // threshold itself is land
        assert_eq!(mask.data()[[0, 2]], 0.0);
    }

    #[test]
    fn mask_values_are_binary_or_nodata() {
        let index = raster(array![[0.9f32, -0.9, 0.01, f32::NAN, 0.0]]);
        let mask = water_mask(&index, WaterIndex::Ndwi, 0.0);
        for &v in mask.data().iter() {
            assert!(v == 0.0 || v == 1.0 || v.is_nan());
        }
    }

    #[test]
    fn mask_keeps_extent_and_shape() {
        let bounds = BoundingBox {
            min_lon: 10.0,
            max_lon: 10.2,
            min_lat: 10.0,
            max_lat: 10.2,
        };
        let index = Raster::filled("NDWI", bounds, 0.01, 0.4);
        let mask = water_mask(&index, WaterIndex::Ndwi, 0.0);
        assert!(mask.same_grid(&index));
        assert_eq!(mask.extent(), index.extent());
    }

    #[test]
    fn raising_threshold_never_grows_water_area() {
        let bounds = BoundingBox {
            min_lon: 0.0,
            max_lon: 1.0,
            min_lat: 0.0,
            max_lat: 1.0,
        };
        let index = Raster::from_fn("NDWI", bounds, 0.05, |lon, lat| (lon + lat - 1.0) as f32);
        let count = |t: f32| {
            water_mask(&index, WaterIndex::Ndwi, t)
                .data()
                .iter()
                .filter(|&&v| v == 1.0)
                .count()
        };
        let low = count(-0.5);
        let mid = count(0.0);
        let high = count(0.5);
        assert!(low >= mid && mid >= high);
        assert!(low > high); // the gradient actually crosses both thresholds
    }

    #[test]
    fn raising_vh_threshold_never_shrinks_water_area() {
        let bounds = BoundingBox {
            min_lon: 0.0,
            max_lon: 1.0,
            min_lat: 0.0,
            max_lat: 1.0,
        };
        // dB gradient from roughly -25 to -5
        let index = Raster::from_fn("VH", bounds, 0.05, |lon, lat| {
            (-25.0 + 10.0 * (lon + lat)) as f32
        });
        let count = |t: f32| {
            water_mask(&index, WaterIndex::Vh, t)
                .data()
                .iter()
                .filter(|&&v| v == 1.0)
                .count()
        };
        let low = count(-20.0);
        let mid = count(-15.0);
        let high = count(-10.0);
        assert!(low <= mid && mid <= high);
        assert!(low < high);
    }
}
