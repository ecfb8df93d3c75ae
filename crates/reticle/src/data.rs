//! On-disk layout of the static lattice and sequence files.
//!
//! ```text
//! <root>/lattices/{lattice}.{vertex}.postcard   postcard-encoded `LatticeFile`
//! <root>/zeros/{ZeroType}.x1.0000               JSON array of ascending f64
//! ```
//!
//! Workers on other hosts rebuild a session purely from the wire form plus
//! these files, so the layout must match across every process of a deployment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ScanError};
use crate::lattice::{LatticeType, VertexType};
use crate::zeros::ZeroType;

/// Fallback data root when neither `APP_DATA` nor `SCAN_DATA_PATH` is set.
pub const DEFAULT_DATA_DIR: &str = "data";

const LATTICE_EXT: &str = "postcard";
const ZEROS_SUFFIX: &str = "x1.0000";

/// Root directory of the static data files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataStore {
    root: PathBuf,
}

impl DataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$APP_DATA/$SCAN_DATA_PATH`, either part optional; `data` if both are unset.
    pub fn from_env() -> Self {
        let app = std::env::var_os("APP_DATA").filter(|v| !v.is_empty());
        let rel = std::env::var_os("SCAN_DATA_PATH").filter(|v| !v.is_empty());
        let root = match (app, rel) {
            (None, None) => PathBuf::from(DEFAULT_DATA_DIR),
            (app, rel) => {
                let mut p = app.map(PathBuf::from).unwrap_or_default();
                if let Some(rel) = rel {
                    p.push(rel);
                }
                p
            }
        };
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lattice_path(&self, lt: LatticeType, vt: VertexType) -> PathBuf {
        self.root.join("lattices").join(format!(
            "{}.{}.{LATTICE_EXT}",
            lt.file_stem(),
            vt.file_stem()
        ))
    }

    pub fn zeros_path(&self, zt: ZeroType) -> PathBuf {
        self.root
            .join("zeros")
            .join(format!("{}.{ZEROS_SUFFIX}", zt.as_str()))
    }

    pub(crate) fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| ScanError::io(path, e))
    }

    pub(crate) fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ScanError::io(parent, e))?;
            }
        }
        fs::write(path, bytes).map_err(|e| ScanError::io(path, e))
    }

    /// Write a raw sequence file (ascending values, unscaled).
    pub fn write_zeros(&self, zt: ZeroType, values: &[f64]) -> Result<PathBuf> {
        let path = self.zeros_path(zt);
        let body = serde_json::to_vec(values)?;
        self.write(&path, &body)?;
        Ok(path)
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_layout() {
        let store = DataStore::new("/srv/data");
        assert_eq!(
            store.lattice_path(LatticeType::Pinwheel, VertexType::Vertices),
            Path::new("/srv/data/lattices/pinwheel.vertices.postcard")
        );
        assert_eq!(
            store.zeros_path(ZeroType::SixNFives),
            Path::new("/srv/data/zeros/SixNFives.x1.0000")
        );
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = DataStore::new(dir.path());
        let path = store.zeros_path(ZeroType::Zeta);
        match store.read(&path) {
            Err(ScanError::Io { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
