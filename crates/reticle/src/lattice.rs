//! Named point lattices: loading, radius filtering and coverage partitioning.
//!
//! A lattice is loaded once from `DataStore` (keyed by lattice and vertex
//! type) and never mutated; `filter` and `partition` return new vectors.
//! `parameters` is carried through to results without interpretation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::DataStore;
use crate::error::{Result, ScanError};
use crate::geom::{circle_intersects_polygon, convex_hull, distance, BoundingBox, Vec2};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LatticeType {
    Pinwheel,
    Fibonacci,
    Grid,
    Penrose,
}

impl LatticeType {
    pub const ALL: [LatticeType; 4] = [Self::Pinwheel, Self::Fibonacci, Self::Grid, Self::Penrose];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pinwheel => "Pinwheel",
            Self::Fibonacci => "Fibonacci",
            Self::Grid => "Grid",
            Self::Penrose => "Penrose",
        }
    }

    pub(crate) fn file_stem(self) -> String {
        self.as_str().to_lowercase()
    }
}

impl fmt::Display for LatticeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LatticeType {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pinwheel" => Ok(Self::Pinwheel),
            "fibonacci" | "fib" => Ok(Self::Fibonacci),
            "grid" => Ok(Self::Grid),
            "penrose" => Ok(Self::Penrose),
            _ => Err(ScanError::UnknownLatticeType(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexType {
    Vertices,
    Centers,
}

impl VertexType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vertices => "Vertices",
            Self::Centers => "Centers",
        }
    }

    pub(crate) fn file_stem(self) -> String {
        self.as_str().to_lowercase()
    }
}

impl fmt::Display for VertexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VertexType {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "vertices" | "vertex" => Ok(Self::Vertices),
            "centers" | "center" => Ok(Self::Centers),
            _ => Err(ScanError::UnknownVertexType(s.to_string())),
        }
    }
}

/// Opaque lattice parameterization, tagged so the payload stays decodable by
/// whoever produced it. An empty `kind` means "no parameters".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LatticeParams {
    pub kind: String,
    pub version: u32,
    pub payload: Vec<u8>,
}

impl LatticeParams {
    pub fn is_empty(&self) -> bool {
        self.kind.is_empty() && self.payload.is_empty()
    }
}

/// Wire form of a lattice: identifies the data file, never carries points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LatticeSpec {
    pub lattice_type: LatticeType,
    pub vertex_type: VertexType,
    #[serde(default)]
    pub parameters: LatticeParams,
}

/// Binary record stored under `lattices/`.
#[derive(Serialize, Deserialize)]
struct LatticeFile {
    lattice_type: LatticeType,
    vertex_type: VertexType,
    parameters: LatticeParams,
    points: Vec<[f64; 2]>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Lattice {
    pub lattice_type: LatticeType,
    pub vertex_type: VertexType,
    pub parameters: LatticeParams,
    points: Vec<Vec2>,
}

impl Lattice {
    pub fn from_points(
        lattice_type: LatticeType,
        vertex_type: VertexType,
        parameters: LatticeParams,
        points: Vec<Vec2>,
    ) -> Self {
        Self {
            lattice_type,
            vertex_type,
            parameters,
            points,
        }
    }

    /// Load the static point set for `(lattice_type, vertex_type)`.
    pub fn load(lattice_type: LatticeType, vertex_type: VertexType, store: &DataStore) -> Result<Self> {
        let path = store.lattice_path(lattice_type, vertex_type);
        let bytes = store.read(&path)?;
        let file: LatticeFile = postcard::from_bytes(&bytes).map_err(|source| {
            ScanError::LatticeFormat {
                path: path.clone(),
                source,
            }
        })?;
        if file.lattice_type != lattice_type || file.vertex_type != vertex_type {
            tracing::warn!(
                path = %path.display(),
                file_lattice = %file.lattice_type,
                file_vertex = %file.vertex_type,
                "lattice file header does not match its name"
            );
        }
        tracing::debug!(
            lattice = %lattice_type,
            vertex = %vertex_type,
            points = file.points.len(),
            "lattice loaded"
        );
        Ok(Self {
            lattice_type,
            vertex_type,
            parameters: file.parameters,
            points: file.points.into_iter().map(|[x, y]| Vec2::new(x, y)).collect(),
        })
    }

    /// Write this lattice to its data file; returns the path written.
    pub fn save(&self, store: &DataStore) -> Result<std::path::PathBuf> {
        let path = store.lattice_path(self.lattice_type, self.vertex_type);
        let file = LatticeFile {
            lattice_type: self.lattice_type,
            vertex_type: self.vertex_type,
            parameters: self.parameters.clone(),
            points: self.points.iter().map(|p| [p.x, p.y]).collect(),
        };
        let bytes = postcard::to_allocvec(&file).map_err(|source| ScanError::LatticeFormat {
            path: path.clone(),
            source,
        })?;
        store.write(&path, &bytes)?;
        Ok(path)
    }

    /// Square grid with integer multiples of `spacing` in `[-half_extent, half_extent]²`.
    pub fn grid(half_extent: f64, spacing: f64) -> Self {
        let n = (half_extent / spacing).floor().max(0.0) as i64;
        let mut points = Vec::with_capacity(((2 * n + 1) * (2 * n + 1)) as usize);
        for i in -n..=n {
            for j in -n..=n {
                points.push(Vec2::new(i as f64 * spacing, j as f64 * spacing));
            }
        }
        let parameters = LatticeParams {
            kind: "grid".into(),
            version: 1,
            payload: spacing.to_le_bytes().to_vec(),
        };
        Self::from_points(LatticeType::Grid, VertexType::Vertices, parameters, points)
    }

    pub fn spec(&self) -> LatticeSpec {
        LatticeSpec {
            lattice_type: self.lattice_type,
            vertex_type: self.vertex_type,
            parameters: self.parameters.clone(),
        }
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points that any tangent construction from an origin within `radius` of
    /// `origin` could reach: distance `<= sqrt((radius + max_zero)² + distance_limit²)`.
    pub fn filter(&self, origin: Vec2, radius: f64, max_zero: f64, distance_limit: f64) -> Vec<Vec2> {
        let reach = filter_reach(radius, max_zero, distance_limit);
        self.points
            .iter()
            .copied()
            .filter(|&p| distance(p, origin) <= reach)
            .collect()
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_points(&self.points)
    }

    /// Circle centers of `radius` covering the lattice's convex hull.
    ///
    /// Staggered rows: rows step `radius` in y, centers step `2·radius` in x,
    /// odd rows shift by `radius`. A center is kept if its circle touches the hull.
    pub fn partition(&self, radius: f64) -> Vec<Vec2> {
        if self.points.is_empty() || !(radius > 0.0) {
            return Vec::new();
        }
        let hull = convex_hull(&self.points);
        let bounds = self.bounds();
        let (lo, hi) = (bounds.min(), bounds.max());

        let mut origins = Vec::new();
        let rows = ((hi.y - lo.y) / radius).ceil() as usize + 1;
        for row in 0..=rows {
            let y = lo.y + row as f64 * radius;
            let offset = if row % 2 == 1 { radius } else { 0.0 };
            let cols = ((hi.x - lo.x + radius) / (2.0 * radius)).ceil() as usize + 1;
            for col in 0..=cols {
                let x = lo.x - radius + offset + col as f64 * 2.0 * radius;
                let center = Vec2::new(x, y);
                if circle_intersects_polygon(&hull, center, radius) {
                    origins.push(center);
                }
            }
        }
        tracing::debug!(
            radius,
            hull = hull.len(),
            origins = origins.len(),
            "lattice partitioned"
        );
        origins
    }
}

#[inline]
pub(crate) fn filter_reach(radius: f64, max_zero: f64, distance_limit: f64) -> f64 {
    ((radius + max_zero).powi(2) + distance_limit.powi(2)).sqrt()
}

impl LatticeSpec {
    pub fn load(&self, store: &DataStore) -> Result<Lattice> {
        let mut lattice = Lattice::load(self.lattice_type, self.vertex_type, store)?;
        if !self.parameters.is_empty() {
            lattice.parameters = self.parameters.clone();
        }
        Ok(lattice)
    }
}
