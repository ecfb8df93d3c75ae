//! Lattice/zero-sequence scan engine.
//!
//! A scan takes a 2D point lattice and a numeric sequence ("zeros"), draws
//! random origins near an anchor, and looks for rotation angles at which many
//! distinct zero values hit a lattice point through the tangent construction
//! in [`scan::all_angles`].
//!
//! Layout
//! - `geom`: vector alias, bounds, hull and polygon predicates.
//! - `lattice`, `zeros`: static data (point sets and sequences) plus their wire specs.
//! - `scan`: kernel, scoring, the `Session` worker pool and `ScoredResults`.
//! - `bus`: the publish seam used to ship sessions and results between processes.
//! - `data`: on-disk layout of the static data files.

pub mod bus;
pub mod data;
pub mod error;
pub mod geom;
pub mod lattice;
pub mod scan;
pub mod zeros;

#[cfg(test)]
pub(crate) mod testutil;

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use data::DataStore;
pub use error::{Result, ScanError};
pub use geom::{BoundingBox, Vec2};
pub use lattice::{Lattice, LatticeParams, LatticeSpec, LatticeType, VertexType};
pub use scan::{
    ScanResult, ScanStream, ScoredResults, ScoringMode, Session, SessionSpec, SessionState,
    SessionStats,
};
pub use zeros::{ZLine, ZLineSpec, ZeroType, Zeros, ZerosSpec};

/// Common exports for callers driving scans.
pub mod prelude {
    pub use crate::bus::{MemoryBus, Publisher};
    pub use crate::geom::{BoundingBox, Vec2};
    pub use crate::lattice::{Lattice, LatticeType, VertexType};
    pub use crate::scan::{ScanResult, Session, SessionSpec, SessionState};
    pub use crate::zeros::{ZLine, ZeroType};
    pub use crate::{DataStore, Result, ScanError};
}
