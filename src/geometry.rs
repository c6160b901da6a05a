//! Immutable geometry value types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Construction failures for geometry values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// A line string needs at least two coordinates.
    #[error("line string needs at least 2 coordinates, got {0}")]
    TooFewLineCoordinates(usize),
    /// A ring needs at least four coordinates (three distinct plus closure).
    #[error("linear ring needs at least 4 coordinates, got {0}")]
    TooFewRingCoordinates(usize),
    /// A ring's first and last coordinates differ.
    #[error("linear ring is not closed")]
    RingNotClosed,
    /// A multi-polygon needs at least one polygon.
    #[error("multi-polygon has no polygons")]
    EmptyMultiPolygon,
}

/// WGS84 coordinate pair in degrees. No altitude component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl Coordinates {
    /// Creates a coordinate pair.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Single position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Position of the point.
    pub coordinates: Coordinates,
}

impl Point {
    /// Creates a point at `coordinates`.
    pub fn new(coordinates: Coordinates) -> Self {
        Self { coordinates }
    }
}

/// Open sequence of at least two positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Coordinates>", into = "Vec<Coordinates>")]
pub struct LineString {
    coordinates: Vec<Coordinates>,
}

impl LineString {
    /// Validates and wraps `coordinates`.
    pub fn new(coordinates: Vec<Coordinates>) -> Result<Self, GeometryError> {
        if coordinates.len() < 2 {
            return Err(GeometryError::TooFewLineCoordinates(coordinates.len()));
        }
        Ok(Self { coordinates })
    }

    /// Positions in order.
    pub fn coordinates(&self) -> &[Coordinates] {
        &self.coordinates
    }
}

/// Closed sequence of positions; first and last coordinates are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Coordinates>", into = "Vec<Coordinates>")]
pub struct LinearRing {
    coordinates: Vec<Coordinates>,
}

impl LinearRing {
    /// Validates and wraps `coordinates`.
    pub fn new(coordinates: Vec<Coordinates>) -> Result<Self, GeometryError> {
        if coordinates.len() < 4 {
            return Err(GeometryError::TooFewRingCoordinates(coordinates.len()));
        }
        if coordinates.first() != coordinates.last() {
            return Err(GeometryError::RingNotClosed);
        }
        Ok(Self { coordinates })
    }

    /// Positions in order, including the closing coordinate.
    pub fn coordinates(&self) -> &[Coordinates] {
        &self.coordinates
    }
}

/// Polygon with one shell and zero or more holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    /// Outer boundary.
    pub shell: LinearRing,
    /// Inner boundaries.
    pub holes: Vec<LinearRing>,
}

impl Polygon {
    /// Creates a polygon without holes.
    pub fn new(shell: LinearRing) -> Self {
        Self {
            shell,
            holes: Vec::new(),
        }
    }

    /// Creates a polygon with holes.
    pub fn with_holes(shell: LinearRing, holes: Vec<LinearRing>) -> Self {
        Self { shell, holes }
    }
}

/// Ordered, non-empty collection of polygons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Polygon>", into = "Vec<Polygon>")]
pub struct MultiPolygon {
    polygons: Vec<Polygon>,
}

impl MultiPolygon {
    /// Validates and wraps `polygons`.
    pub fn new(polygons: Vec<Polygon>) -> Result<Self, GeometryError> {
        if polygons.is_empty() {
            return Err(GeometryError::EmptyMultiPolygon);
        }
        Ok(Self { polygons })
    }

    /// Polygons in order.
    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }
}

/// Closed set of geometry variants.
///
/// Every consumer matches exhaustively, so a new variant fails to compile
/// until each translation site handles it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Geometry {
    /// Single position.
    Point(Point),
    /// Open line.
    LineString(LineString),
    /// Closed ring without area semantics.
    LinearRing(LinearRing),
    /// Area with optional holes.
    Polygon(Polygon),
    /// Several areas.
    MultiPolygon(MultiPolygon),
}

impl Geometry {
    /// Short variant name used in diagnostics.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::LineString(_) => "LineString",
            Self::LinearRing(_) => "LinearRing",
            Self::Polygon(_) => "Polygon",
            Self::MultiPolygon(_) => "MultiPolygon",
        }
    }
}

// Decoding goes through the validating constructors.

impl TryFrom<Vec<Coordinates>> for LineString {
    type Error = GeometryError;

    fn try_from(value: Vec<Coordinates>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LineString> for Vec<Coordinates> {
    fn from(value: LineString) -> Self {
        value.coordinates
    }
}

impl TryFrom<Vec<Coordinates>> for LinearRing {
    type Error = GeometryError;

    fn try_from(value: Vec<Coordinates>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LinearRing> for Vec<Coordinates> {
    fn from(value: LinearRing) -> Self {
        value.coordinates
    }
}

impl TryFrom<Vec<Polygon>> for MultiPolygon {
    type Error = GeometryError;

    fn try_from(value: Vec<Polygon>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MultiPolygon> for Vec<Polygon> {
    fn from(value: MultiPolygon) -> Self {
        value.polygons
    }
}

impl From<Point> for Geometry {
    fn from(value: Point) -> Self {
        Self::Point(value)
    }
}

impl From<Polygon> for Geometry {
    fn from(value: Polygon) -> Self {
        Self::Polygon(value)
    }
}

impl From<MultiPolygon> for Geometry {
    fn from(value: MultiPolygon) -> Self {
        Self::MultiPolygon(value)
    }
}
