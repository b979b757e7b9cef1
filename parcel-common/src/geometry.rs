//! Geometry kernel
//!
//! Pure functions over WGS-84 coordinates: validation, great-circle distance,
//! initial bearing, boundary containment and the meters-to-degrees conversion
//! used when perturbing a GPS fix. No state, no I/O.

use geo::{BoundingRect, Contains, LineString, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Mean Earth radius used by the Haversine formula (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters spanned by one degree of latitude on the sphere above
pub const METERS_PER_DEGREE_LAT: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Cosine floor for longitude compensation near the poles
const MIN_COS_LATITUDE: f64 = 1e-6;

/// Validated WGS-84 position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude above sea level (meters), when the capture device reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

impl Coordinate {
    /// Build without validation; callers holding untrusted input use [`validate_coordinate`]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
        }
    }

    pub fn with_altitude(mut self, altitude: Option<f64>) -> Self {
        self.altitude = altitude;
        self
    }

    /// Cache/lookup key with a fixed number of decimal places, e.g. `"40.712800,-74.006000"`
    ///
    /// Values that round to zero always format as `0.000000`, never `-0.000000`.
    pub fn quantized_key(&self, decimals: usize) -> String {
        let rounded = self.quantized(decimals as i32);
        format!(
            "{:.prec$},{:.prec$}",
            rounded.latitude,
            rounded.longitude,
            prec = decimals
        )
    }

    /// Round both axes to `decimals` places
    pub fn quantized(&self, decimals: i32) -> Self {
        let factor = 10f64.powi(decimals);
        // Adding 0.0 turns -0.0 into +0.0
        Self {
            latitude: (self.latitude * factor).round() / factor + 0.0,
            longitude: (self.longitude * factor).round() / factor + 0.0,
            altitude: self.altitude,
        }
    }

    fn to_point(self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Untrusted degree value as it arrives from EXIF extraction or an API body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDegrees {
    Number(f64),
    Text(String),
}

impl From<f64> for RawDegrees {
    fn from(value: f64) -> Self {
        RawDegrees::Number(value)
    }
}

impl From<&str> for RawDegrees {
    fn from(value: &str) -> Self {
        RawDegrees::Text(value.to_string())
    }
}

impl From<String> for RawDegrees {
    fn from(value: String) -> Self {
        RawDegrees::Text(value)
    }
}

/// Which axis failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Latitude => f.write_str("latitude"),
            Axis::Longitude => f.write_str("longitude"),
        }
    }
}

/// Coordinate rejected before any downstream use
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidCoordinate {
    #[error("{axis} is not numeric: {value:?}")]
    NotNumeric { axis: Axis, value: String },

    #[error("{axis} is not a finite number")]
    NotFinite { axis: Axis },

    #[error("{axis} out of range: {value}")]
    OutOfRange { axis: Axis, value: f64 },
}

fn parse_axis(raw: RawDegrees, axis: Axis, limit: f64) -> Result<f64, InvalidCoordinate> {
    let value = match raw {
        RawDegrees::Number(v) => v,
        RawDegrees::Text(text) => {
            text.trim()
                .parse::<f64>()
                .map_err(|_| InvalidCoordinate::NotNumeric {
                    axis,
                    value: text.clone(),
                })?
        }
    };

    if !value.is_finite() {
        return Err(InvalidCoordinate::NotFinite { axis });
    }
    if value < -limit || value > limit {
        return Err(InvalidCoordinate::OutOfRange { axis, value });
    }
    Ok(value)
}

/// Parse and range-check a latitude/longitude pair
///
/// Accepts numbers or numeric strings. Latitude must lie in [-90, 90] and
/// longitude in [-180, 180].
pub fn validate_coordinate(
    latitude: impl Into<RawDegrees>,
    longitude: impl Into<RawDegrees>,
) -> Result<Coordinate, InvalidCoordinate> {
    let latitude = parse_axis(latitude.into(), Axis::Latitude, 90.0)?;
    let longitude = parse_axis(longitude.into(), Axis::Longitude, 180.0)?;
    Ok(Coordinate::new(latitude, longitude))
}

/// Great-circle distance in meters (Haversine)
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_M * c
}

/// Initial bearing from `from` to `to`, in [0, 360)
pub fn bearing_degrees(from: &Coordinate, to: &Coordinate) -> f64 {
    let phi1 = from.latitude.to_radians();
    let phi2 = to.latitude.to_radians();
    let d_lambda = (to.longitude - from.longitude).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    normalize_heading(y.atan2(x).to_degrees())
}

/// Wrap any angle into [0, 360)
pub fn normalize_heading(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Smallest angle between two headings, in [0, 180]
pub fn angular_difference(a: f64, b: f64) -> f64 {
    let diff = (normalize_heading(a) - normalize_heading(b)).abs();
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Euclidean distance in degree space
pub fn coordinate_delta(a: &Coordinate, b: &Coordinate) -> f64 {
    let d_lat = a.latitude - b.latitude;
    let d_lng = a.longitude - b.longitude;
    (d_lat * d_lat + d_lng * d_lng).sqrt()
}

/// Convert a linear distance into (latitude, longitude) degree offsets at `latitude`
pub fn meters_to_degree_offset(meters: f64, latitude: f64) -> (f64, f64) {
    let d_lat = meters / METERS_PER_DEGREE_LAT;
    let cos_lat = latitude.to_radians().cos().abs().max(MIN_COS_LATITUDE);
    (d_lat, d_lat / cos_lat)
}

/// One polygon of a parcel: an exterior ring and its exclusion rings
///
/// Rings are stored in GeoJSON order: `[longitude, latitude]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonRings {
    pub exterior: Vec<[f64; 2]>,
    #[serde(default)]
    pub holes: Vec<Vec<[f64; 2]>>,
}

impl PolygonRings {
    fn is_degenerate(&self) -> bool {
        self.exterior.len() < 3
    }

    fn to_polygon(&self) -> Polygon<f64> {
        let ring = |points: &[[f64; 2]]| -> LineString<f64> {
            points.iter().map(|p| (p[0], p[1])).collect::<Vec<_>>().into()
        };
        Polygon::new(
            ring(&self.exterior),
            self.holes.iter().map(|hole| ring(hole)).collect(),
        )
    }
}

/// Parcel boundary in geographic coordinates
///
/// A parcel split by a road or river has several members; a point inside
/// any member is inside the parcel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelBoundary {
    pub polygons: Vec<PolygonRings>,
}

/// Axis-aligned extent of a boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Half of the diagonal, in degrees
    pub fn half_diagonal(&self) -> f64 {
        let d_lat = self.max_lat - self.min_lat;
        let d_lng = self.max_lng - self.min_lng;
        (d_lat * d_lat + d_lng * d_lng).sqrt() / 2.0
    }
}

impl ParcelBoundary {
    pub fn new(exterior: Vec<[f64; 2]>) -> Self {
        Self {
            polygons: vec![PolygonRings {
                exterior,
                holes: Vec::new(),
            }],
        }
    }

    /// Add a hole to the most recently added member
    pub fn with_hole(mut self, hole: Vec<[f64; 2]>) -> Self {
        if let Some(last) = self.polygons.last_mut() {
            last.holes.push(hole);
        }
        self
    }

    /// Add another disjoint member
    pub fn with_member(mut self, exterior: Vec<[f64; 2]>) -> Self {
        self.polygons.push(PolygonRings {
            exterior,
            holes: Vec::new(),
        });
        self
    }

    /// No member has the three vertices needed to enclose anything
    pub fn is_degenerate(&self) -> bool {
        self.polygons.iter().all(PolygonRings::is_degenerate)
    }

    fn to_multi_polygon(&self) -> MultiPolygon<f64> {
        self.polygons
            .iter()
            .filter(|member| !member.is_degenerate())
            .map(PolygonRings::to_polygon)
            .collect::<Vec<_>>()
            .into()
    }

    /// Extent of every non-degenerate member
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.to_multi_polygon().bounding_rect().map(|rect| BoundingBox {
            min_lat: rect.min().y,
            min_lng: rect.min().x,
            max_lat: rect.max().y,
            max_lng: rect.max().x,
        })
    }

    /// 1.0 at the bounding-box center, falling linearly to 0.0 at a corner
    pub fn centeredness(&self, point: &Coordinate) -> f64 {
        let Some(bbox) = self.bounding_box() else {
            return 0.0;
        };
        let half_diagonal = bbox.half_diagonal();
        if half_diagonal <= 0.0 {
            return 0.0;
        }
        let offset = coordinate_delta(point, &bbox.center());
        (1.0 - offset / half_diagonal).clamp(0.0, 1.0)
    }
}

/// Whether `point` lies inside some member's exterior ring and outside its holes
///
/// Points exactly on an edge are treated as outside.
pub fn point_in_polygon(point: &Coordinate, boundary: &ParcelBoundary) -> bool {
    if boundary.is_degenerate() {
        return false;
    }
    boundary.to_multi_polygon().contains(&point.to_point())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> ParcelBoundary {
        ParcelBoundary::new(vec![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]])
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        for (lat, lng) in [(0.0, 0.0), (40.7128, -74.006), (-33.8688, 151.2093), (89.9, 179.9)] {
            let a = Coordinate::new(lat, lng);
            assert_eq!(distance_meters(&a, &a), 0.0);
        }
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = Coordinate::new(40.7128, -74.006);
        let b = Coordinate::new(34.0522, -118.2437);
        let ab = distance_meters(&a, &b);
        let ba = distance_meters(&b, &a);
        assert!((ab - ba).abs() < 1e-6);
        assert!(ab > 3_900_000.0 && ab < 4_000_000.0, "NYC-LA distance was {}", ab);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(1.0, 0.0);
        assert!((distance_meters(&a, &b) - METERS_PER_DEGREE_LAT).abs() < 1e-3);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = Coordinate::new(0.0, 0.0);
        assert!((bearing_degrees(&origin, &Coordinate::new(1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((bearing_degrees(&origin, &Coordinate::new(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((bearing_degrees(&origin, &Coordinate::new(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((bearing_degrees(&origin, &Coordinate::new(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_bearing_always_in_range() {
        let from = Coordinate::new(10.0, 10.0);
        for (lat, lng) in [(10.0, 9.999_999), (9.0, 9.0), (11.0, 11.0), (10.000_001, 10.0)] {
            let b = bearing_degrees(&from, &Coordinate::new(lat, lng));
            assert!((0.0..360.0).contains(&b), "bearing {} out of range", b);
        }
    }

    #[test]
    fn test_angular_difference_wraps() {
        assert!((angular_difference(350.0, 10.0) - 20.0).abs() < 1e-9);
        assert!((angular_difference(10.0, 350.0) - 20.0).abs() < 1e-9);
        assert!((angular_difference(0.0, 180.0) - 180.0).abs() < 1e-9);
        assert!((angular_difference(-45.0, 45.0) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(matches!(
            validate_coordinate(91.0, 0.0),
            Err(InvalidCoordinate::OutOfRange { axis: Axis::Latitude, .. })
        ));
        assert!(matches!(
            validate_coordinate(0.0, 181.0),
            Err(InvalidCoordinate::OutOfRange { axis: Axis::Longitude, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_non_numeric_and_nan() {
        assert!(matches!(
            validate_coordinate("north", "0"),
            Err(InvalidCoordinate::NotNumeric { .. })
        ));
        assert!(matches!(
            validate_coordinate(f64::NAN, 0.0),
            Err(InvalidCoordinate::NotFinite { .. })
        ));
        // "NaN" parses as f64 but is still rejected
        assert!(validate_coordinate("NaN", "0").is_err());
    }

    #[test]
    fn test_validate_accepts_bounds_and_strings() {
        assert_eq!(validate_coordinate(0.0, 0.0).unwrap(), Coordinate::new(0.0, 0.0));
        assert_eq!(validate_coordinate(-90.0, 180.0).unwrap(), Coordinate::new(-90.0, 180.0));
        assert_eq!(
            validate_coordinate(" 40.5 ", "-74.25").unwrap(),
            Coordinate::new(40.5, -74.25)
        );
    }

    #[test]
    fn test_point_in_unit_square() {
        let square = unit_square();
        assert!(point_in_polygon(&Coordinate::new(0.5, 0.5), &square));
        assert!(!point_in_polygon(&Coordinate::new(2.0, 2.0), &square));
    }

    #[test]
    fn test_point_in_hole_is_excluded() {
        let with_hole = unit_square().with_hole(vec![
            [0.4, 0.4],
            [0.4, 0.6],
            [0.6, 0.6],
            [0.6, 0.4],
            [0.4, 0.4],
        ]);
        assert!(!point_in_polygon(&Coordinate::new(0.5, 0.5), &with_hole));
        assert!(point_in_polygon(&Coordinate::new(0.2, 0.2), &with_hole));
    }

    #[test]
    fn test_point_in_second_member_is_contained() {
        let split = unit_square().with_member(vec![
            [5.0, 5.0],
            [5.0, 6.0],
            [6.0, 6.0],
            [6.0, 5.0],
            [5.0, 5.0],
        ]);
        assert!(point_in_polygon(&Coordinate::new(5.5, 5.5), &split));
        assert!(point_in_polygon(&Coordinate::new(0.5, 0.5), &split));
        assert!(!point_in_polygon(&Coordinate::new(3.0, 3.0), &split));

        let bbox = split.bounding_box().unwrap();
        assert_eq!((bbox.min_lat, bbox.max_lat), (0.0, 6.0));
    }

    #[test]
    fn test_degenerate_member_is_ignored() {
        let square = unit_square().polygons[0].exterior.clone();
        let mixed = ParcelBoundary::new(vec![[9.0, 9.0], [9.5, 9.5]]).with_member(square);
        assert!(!mixed.is_degenerate());
        assert!(point_in_polygon(&Coordinate::new(0.5, 0.5), &mixed));
        assert_eq!(mixed.bounding_box().unwrap().max_lng, 1.0);
    }

    #[test]
    fn test_degenerate_boundary_contains_nothing() {
        let line = ParcelBoundary::new(vec![[0.0, 0.0], [1.0, 1.0]]);
        assert!(!point_in_polygon(&Coordinate::new(0.5, 0.5), &line));
    }

    #[test]
    fn test_centeredness() {
        let square = unit_square();
        assert!((square.centeredness(&Coordinate::new(0.5, 0.5)) - 1.0).abs() < 1e-12);
        assert!(square.centeredness(&Coordinate::new(0.0, 0.0)).abs() < 1e-12);
        let halfway = square.centeredness(&Coordinate::new(0.25, 0.25));
        assert!((halfway - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_meters_to_degree_offset_compensates_longitude() {
        let (d_lat, d_lng) = meters_to_degree_offset(15.0, 0.0);
        assert!((d_lat - d_lng).abs() < 1e-12);

        let (d_lat, d_lng) = meters_to_degree_offset(15.0, 60.0);
        assert!((d_lng - d_lat * 2.0).abs() < 1e-9);
        assert!((d_lat * METERS_PER_DEGREE_LAT - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_quantized_key() {
        let c = Coordinate::new(40.712_812_34, -74.006_000_9);
        assert_eq!(c.quantized_key(6), "40.712812,-74.006001");
    }

    #[test]
    fn test_quantized_key_has_no_negative_zero() {
        let near_origin = Coordinate::new(-0.000_000_1, -0.000_000_4);
        assert_eq!(near_origin.quantized_key(6), "0.000000,0.000000");
        assert_eq!(near_origin.quantized_key(6), Coordinate::new(0.0, 0.0).quantized_key(6));
        assert_eq!(near_origin.quantized(6).latitude.to_bits(), 0.0f64.to_bits());
    }
}
