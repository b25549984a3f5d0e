use chrono::NaiveDate;
use geo::Area;
use geo_types::{LineString, Polygon};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raster cell value; NaN marks nodata
pub type Pixel = f32;

/// 2D single-band raster data (row x col)
pub type Grid = Array2<Pixel>;

/// Imagery family a water index is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaterSource {
    /// Sentinel-2 multispectral
    Optical,
    /// Sentinel-1 synthetic-aperture radar
    Radar,
}

impl std::fmt::Display for WaterSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaterSource::Optical => write!(f, "Sentinel-2"),
            WaterSource::Radar => write!(f, "Sentinel-1"),
        }
    }
}

// `HydroError::NoImageryFound` carries this enum in a field named
// `source`, which thiserror unconditionally wires into `Error::source`;
// that requires the field type to implement `std::error::Error`.
impl std::error::Error for WaterSource {}

/// Water index kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaterIndex {
    /// Normalized Difference Water Index: (green - NIR) / (green + NIR)
    Ndwi,
    /// Modified NDWI: (green - SWIR) / (green + SWIR)
    Mndwi,
    /// VH backscatter in dB; water is a low-return surface
    Vh,
}

impl WaterIndex {
    pub fn name(&self) -> &'static str {
        match self {
            WaterIndex::Ndwi => "NDWI",
            WaterIndex::Mndwi => "MNDWI",
            WaterIndex::Vh => "VH",
        }
    }

    pub fn source(&self) -> WaterSource {
        match self {
            WaterIndex::Ndwi | WaterIndex::Mndwi => WaterSource::Optical,
            WaterIndex::Vh => WaterSource::Radar,
        }
    }

    /// Band name carried by the thresholded mask, e.g. "NDWI_water_mask"
    pub fn mask_band(&self) -> String {
        format!("{}_water_mask", self.name())
    }

    /// Property key for the per-feature index mean, e.g. "ndwi_mean"
    pub fn mean_property(&self) -> String {
        format!("{}_mean", self.name().to_lowercase())
    }

    /// Threshold direction: optical indices flag water above the
    /// threshold, VH backscatter below it.
    pub fn is_water(&self, value: Pixel, threshold: Pixel) -> bool {
        match self {
            WaterIndex::Ndwi | WaterIndex::Mndwi => value > threshold,
            WaterIndex::Vh => value < threshold,
        }
    }
}

impl std::fmt::Display for WaterIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Polarization modes for Sentinel-1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::VV => write!(f, "VV"),
            Polarization::VH => write!(f, "VH"),
            Polarization::HV => write!(f, "HV"),
            Polarization::HH => write!(f, "HH"),
        }
    }
}

/// Sentinel-1 acquisition mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionMode {
    IW, // Interferometric Wide swath
    EW, // Extra Wide swath
    SM, // StripMap
    WV, // Wave
}

/// Orbit direction of a radar acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrbitPass {
    Ascending,
    Descending,
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }
}

/// Geospatial transformation parameters (GDAL-style affine)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square pixels; `pixel_size` is in degrees
    /// and `pixel_height` is stored negative (rows grow southward).
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        GeoTransform {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    /// Geographic coordinates of the top-left corner of pixel (row, col)
    pub fn corner(&self, row: usize, col: usize) -> (f64, f64) {
        let lon = self.top_left_x + col as f64 * self.pixel_width + row as f64 * self.rotation_x;
        let lat = self.top_left_y + col as f64 * self.rotation_y + row as f64 * self.pixel_height;
        (lon, lat)
    }

    /// Geographic coordinates of the center of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let r = row as f64 + 0.5;
        let c = col as f64 + 0.5;
        let lon = self.top_left_x + c * self.pixel_width + r * self.rotation_x;
        let lat = self.top_left_y + c * self.rotation_y + r * self.pixel_height;
        (lon, lat)
    }
}

/// Single-band floating-point raster with its georeferencing.
///
/// Cell values are `f32` with NaN as the nodata marker, so masking and
/// clipping never need a sidecar validity plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    band: String,
    transform: GeoTransform,
    data: Grid,
}

impl Raster {
    pub fn new(band: impl Into<String>, transform: GeoTransform, data: Grid) -> Self {
        Raster {
            band: band.into(),
            transform,
            data,
        }
    }

    /// Constant-valued raster covering `bounds` at `pixel_size` degrees
    pub fn filled(
        band: impl Into<String>,
        bounds: BoundingBox,
        pixel_size: f64,
        value: Pixel,
    ) -> Self {
        Self::from_fn(band, bounds, pixel_size, |_, _| value)
    }

    /// Synthesize a raster covering `bounds` at `pixel_size` degrees,
    /// sampling `f(lon, lat)` at each pixel center. The usual way to seed
    /// a [`MemoryEngine`](crate::engine::MemoryEngine) scene catalog.
    pub fn from_fn(
        band: impl Into<String>,
        bounds: BoundingBox,
        pixel_size: f64,
        f: impl Fn(f64, f64) -> Pixel,
    ) -> Self {
        let rows = span_pixels(bounds.height(), pixel_size);
        let cols = span_pixels(bounds.width(), pixel_size);
        let transform = GeoTransform::north_up(bounds.min_lon, bounds.max_lat, pixel_size);
        let data = Array2::from_shape_fn((rows, cols), |(r, c)| {
            let (lon, lat) = transform.pixel_center(r, c);
            f(lon, lat)
        });
        Raster::new(band, transform, data)
    }

    pub fn band(&self) -> &str {
        &self.band
    }

    /// Same pixel grid under a different band name
    pub fn with_band(&self, band: impl Into<String>) -> Raster {
        Raster {
            band: band.into(),
            transform: self.transform,
            data: self.data.clone(),
        }
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn data(&self) -> &Grid {
        &self.data
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Geographic extent covered by the pixel grid
    pub fn extent(&self) -> BoundingBox {
        let (rows, cols) = self.shape();
        BoundingBox {
            min_lon: self.transform.top_left_x,
            max_lon: self.transform.top_left_x + cols as f64 * self.transform.pixel_width,
            min_lat: self.transform.top_left_y + rows as f64 * self.transform.pixel_height,
            max_lat: self.transform.top_left_y,
        }
    }

    /// Whether two rasters share shape and georeferencing, i.e. can be
    /// combined pixel-wise.
    pub fn same_grid(&self, other: &Raster) -> bool {
        self.shape() == other.shape() && self.transform == other.transform
    }
}

/// Pixels needed to span `extent` degrees at `pixel_size` degrees per
/// pixel. The epsilon keeps accumulated float error in the extent from
/// manufacturing a spurious trailing row or column.
pub(crate) fn span_pixels(extent: f64, pixel_size: f64) -> usize {
    ((extent / pixel_size - 1e-9).ceil() as usize).max(1)
}

/// Closed polygonal area of interest in lon/lat degrees
#[derive(Debug, Clone, PartialEq)]
pub struct AreaOfInterest {
    ring: Vec<(f64, f64)>,
}

impl AreaOfInterest {
    /// Validates that `ring` is closed (first point repeated last), has at
    /// least four points and spans a non-zero area.
    pub fn new(ring: Vec<(f64, f64)>) -> HydroResult<Self> {
        if ring.len() < 4 {
            return Err(HydroError::InvalidGeometry(format!(
                "polygon ring needs at least 4 points, got {}",
                ring.len()
            )));
        }
        if ring.iter().any(|(lon, lat)| !lon.is_finite() || !lat.is_finite()) {
            return Err(HydroError::InvalidGeometry(
                "polygon ring contains non-finite coordinates".to_string(),
            ));
        }
        let first = ring[0];
        let last = ring[ring.len() - 1];
        if first != last {
            return Err(HydroError::InvalidGeometry(format!(
                "polygon ring is not closed: first point {:?} != last point {:?}",
                first, last
            )));
        }
        let area = AreaOfInterest { ring };
        if area.to_polygon().unsigned_area() == 0.0 {
            return Err(HydroError::InvalidGeometry(
                "polygon ring spans zero area".to_string(),
            ));
        }
        Ok(area)
    }

    /// Axis-aligned rectangular area, closed counter-clockwise
    pub fn rect(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        AreaOfInterest {
            ring: vec![
                (min_lon, min_lat),
                (max_lon, min_lat),
                (max_lon, max_lat),
                (min_lon, max_lat),
                (min_lon, min_lat),
            ],
        }
    }

    pub fn ring(&self) -> &[(f64, f64)] {
        &self.ring
    }

    /// Ring as [lon, lat] pairs, the shape requests and metadata carry
    pub fn coordinates(&self) -> Vec<[f64; 2]> {
        self.ring.iter().map(|&(lon, lat)| [lon, lat]).collect()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox {
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
        };
        for &(lon, lat) in &self.ring {
            bbox.min_lon = bbox.min_lon.min(lon);
            bbox.max_lon = bbox.max_lon.max(lon);
            bbox.min_lat = bbox.min_lat.min(lat);
            bbox.max_lat = bbox.max_lat.max(lat);
        }
        bbox
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Polygon::new(LineString::from(self.ring.clone()), vec![])
    }
}

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> HydroResult<Self> {
        if start > end {
            return Err(HydroError::InvalidDateRange(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(DateRange { start, end })
    }

    /// Parse from ISO "YYYY-MM-DD" strings
    pub fn parse(start: &str, end: &str) -> HydroResult<Self> {
        let parse_one = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
                HydroError::InvalidDateRange(format!("cannot parse date {:?}: {}", s, e))
            })
        };
        Self::new(parse_one(start)?, parse_one(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

fn default_vh_threshold() -> f32 {
    1.25
}

/// Wire-level request body shared by all mask and grid operations.
///
/// Thresholds are optional on the wire; `vh_threshold` defaults to
/// 1.25 dB and the optical thresholds to 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterIndexRequest {
    pub coordinates: Vec<[f64; 2]>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_vh_threshold")]
    pub vh_threshold: f32,
    #[serde(default)]
    pub ndwi_threshold: f32,
    #[serde(default)]
    pub mndwi_threshold: f32,
}

impl WaterIndexRequest {
    pub fn area(&self) -> HydroResult<AreaOfInterest> {
        AreaOfInterest::new(self.coordinates.iter().map(|&[lon, lat]| (lon, lat)).collect())
    }

    pub fn date_range(&self) -> HydroResult<DateRange> {
        DateRange::new(self.start_date, self.end_date)
    }

    pub fn threshold(&self, index: WaterIndex) -> f32 {
        match index {
            WaterIndex::Ndwi => self.ndwi_threshold,
            WaterIndex::Mndwi => self.mndwi_threshold,
            WaterIndex::Vh => self.vh_threshold,
        }
    }
}

/// Error type for water-mask operations
#[derive(Debug, Error)]
pub enum HydroError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("no {source} imagery found between {start} and {end}")]
    NoImageryFound {
        source: WaterSource,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("imagery engine failure: {0}")]
    ExternalService(String),

    #[error("grid cell {cell} failed: {source}")]
    CellProcessing {
        cell: usize,
        source: Box<HydroError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("processing error: {0}")]
    Processing(String),
}

/// Result type for water-mask operations
pub type HydroResult<T> = Result<T, HydroError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn index_names_and_sources() {
        assert_eq!(WaterIndex::Ndwi.name(), "NDWI");
        assert_eq!(WaterIndex::Mndwi.mask_band(), "MNDWI_water_mask");
        assert_eq!(WaterIndex::Vh.mean_property(), "vh_mean");
        assert_eq!(WaterIndex::Ndwi.source(), WaterSource::Optical);
        assert_eq!(WaterIndex::Vh.source(), WaterSource::Radar);
    }

    #[test]
    fn threshold_direction() {
        assert!(WaterIndex::Ndwi.is_water(0.3, 0.0));
        assert!(!WaterIndex::Ndwi.is_water(-0.1, 0.0));
        assert!(WaterIndex::Vh.is_water(-22.0, 1.25));
        assert!(!WaterIndex::Vh.is_water(4.0, 1.25));
    }

    #[test]
    fn aoi_rejects_open_ring() {
        let err = AreaOfInterest::new(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        assert!(matches!(err, Err(HydroError::InvalidGeometry(_))));
    }

    #[test]
    fn aoi_rejects_too_few_points() {
        let err = AreaOfInterest::new(vec![(0.0, 0.0), (1.0, 0.0), (0.0, 0.0)]);
        assert!(matches!(err, Err(HydroError::InvalidGeometry(_))));
    }

    #[test]
    fn aoi_rejects_degenerate_area() {
        let err = AreaOfInterest::new(vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (0.0, 0.0)]);
        assert!(matches!(err, Err(HydroError::InvalidGeometry(_))));
    }

    #[test]
    fn aoi_bounding_box() {
        let aoi = AreaOfInterest::rect(10.0, 20.0, 10.4, 20.2);
        let bbox = aoi.bounding_box();
        assert_eq!(bbox.min_lon, 10.0);
        assert_eq!(bbox.max_lon, 10.4);
        assert_eq!(bbox.min_lat, 20.0);
        assert_eq!(bbox.max_lat, 20.2);
    }

    #[test]
    fn date_range_ordering() {
        assert!(DateRange::parse("2023-06-30", "2023-06-01").is_err());
        let range = DateRange::parse("2023-06-01", "2023-06-30").unwrap();
        assert!(range.contains(date("2023-06-01")));
        assert!(range.contains(date("2023-06-30")));
        assert!(!range.contains(date("2023-07-01")));
    }

    #[test]
    fn request_threshold_defaults() {
        let body = r#"{
            "coordinates": [[10.0, 10.0], [10.2, 10.0], [10.2, 10.2], [10.0, 10.2], [10.0, 10.0]],
            "start_date": "2023-06-01",
            "end_date": "2023-06-30"
        }"#;
        let req: WaterIndexRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.threshold(WaterIndex::Vh), 1.25);
        assert_eq!(req.threshold(WaterIndex::Ndwi), 0.0);
        assert_eq!(req.threshold(WaterIndex::Mndwi), 0.0);
        assert!(req.area().is_ok());
        assert!(req.date_range().is_ok());
    }

    #[test]
    fn raster_extent_and_grid_identity() {
        let bounds = BoundingBox {
            min_lon: 10.0,
            max_lon: 10.1,
            min_lat: 20.0,
            max_lat: 20.1,
        };
        let a = Raster::filled("B3", bounds, 0.01, 1.0);
        let b = Raster::filled("B8", bounds, 0.01, 2.0);
        assert_eq!(a.shape(), (10, 10));
        assert!(a.same_grid(&b));
        let extent = a.extent();
        assert!((extent.min_lon - 10.0).abs() < 1e-9);
        assert!((extent.max_lat - 20.1).abs() < 1e-9);
    }

    #[test]
    fn transform_pixel_center() {
        let t = GeoTransform::north_up(10.0, 20.0, 0.1);
        let (lon, lat) = t.pixel_center(0, 0);
        assert!((lon - 10.05).abs() < 1e-12);
        assert!((lat - 19.95).abs() < 1e-12);
        let (lon, lat) = t.corner(1, 2);
        assert!((lon - 10.2).abs() < 1e-12);
        assert!((lat - 19.9).abs() < 1e-12);
    }
}
