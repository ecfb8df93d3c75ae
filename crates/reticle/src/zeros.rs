//! Zero sequences and the ZLine that anchors a scan.
//!
//! Sequence files hold ascending raw values. Loading truncates at the first
//! raw value above the limit, then scales; with `negatives` every kept value
//! is followed by its negation. The same inputs always reload to the same
//! `values`, which is what lets a remote worker rebuild a session from its
//! wire form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::DataStore;
use crate::error::{Result, ScanError};
use crate::geom::{xy, Vec2};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZeroType {
    /// Prime numbers.
    Primes,
    /// Numbers 6n-1, not divisible by 5 and not prime.
    SixNFives,
    /// Numbers 6n-1 that are not prime.
    SixN,
    /// Zeros of the Riemann zeta function.
    Zeta,
    /// `zeta * ln(zeta) / 2π`.
    ZetaNorm1,
    ZetaNorm2,
    /// Whole numbers from 4 that are not prime.
    Comp1,
    /// Whole numbers from 4 in neither SixN nor Primes.
    Comp2,
}

impl ZeroType {
    pub const ALL: [ZeroType; 8] = [
        Self::Primes,
        Self::SixNFives,
        Self::SixN,
        Self::Zeta,
        Self::ZetaNorm1,
        Self::ZetaNorm2,
        Self::Comp1,
        Self::Comp2,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primes => "Primes",
            Self::SixNFives => "SixNFives",
            Self::SixN => "SixN",
            Self::Zeta => "Zeta",
            Self::ZetaNorm1 => "ZetaNorm1",
            Self::ZetaNorm2 => "ZetaNorm2",
            Self::Comp1 => "Comp1",
            Self::Comp2 => "Comp2",
        }
    }
}

impl fmt::Display for ZeroType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZeroType {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "primes" | "prime" => Ok(Self::Primes),
            "sixnfives" | "sixn5s" | "6n5s" | "sixnfive" | "sixn5" | "6n5" => Ok(Self::SixNFives),
            "sixn" | "6n" => Ok(Self::SixN),
            "zeta" | "zetas" => Ok(Self::Zeta),
            "zetanorm1" => Ok(Self::ZetaNorm1),
            "zetanorm2" => Ok(Self::ZetaNorm2),
            "comp1" | "comp1s" => Ok(Self::Comp1),
            "comp2" | "comp2s" => Ok(Self::Comp2),
            _ => Err(ScanError::UnknownZeroType(s.to_string())),
        }
    }
}

/// Wire form of a loaded sequence. `count` is informational; values are
/// reloaded with [`ZerosSpec::load`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ZerosSpec {
    pub zero_type: ZeroType,
    pub scalar: f64,
    pub negatives: bool,
    #[serde(default)]
    pub count: usize,
}

impl ZerosSpec {
    pub fn load(&self, limit: f64, store: &DataStore) -> Result<Zeros> {
        let zeros = Zeros::load(self.zero_type, limit, self.scalar, self.negatives, store)?;
        if self.count != 0 && self.count != zeros.count() {
            tracing::warn!(
                zero_type = %self.zero_type,
                wire = self.count,
                loaded = zeros.count(),
                "sequence count differs from the sender's"
            );
        }
        Ok(zeros)
    }
}

/// A loaded, scaled sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct Zeros {
    pub zero_type: ZeroType,
    pub scalar: f64,
    pub negatives: bool,
    values: Vec<f64>,
}

impl Zeros {
    pub fn load(
        zero_type: ZeroType,
        limit: f64,
        scalar: f64,
        negatives: bool,
        store: &DataStore,
    ) -> Result<Self> {
        let path = store.zeros_path(zero_type);
        let bytes = store.read(&path)?;
        let raw: Vec<f64> = serde_json::from_slice(&bytes)
            .map_err(|source| ScanError::SequenceFormat { path, source })?;
        Ok(Self::from_raw(zero_type, &raw, limit, scalar, negatives))
    }

    /// Truncate/scale/negate an ascending raw sequence.
    pub fn from_raw(
        zero_type: ZeroType,
        raw: &[f64],
        limit: f64,
        scalar: f64,
        negatives: bool,
    ) -> Self {
        let mut values = Vec::with_capacity(if negatives { raw.len() * 2 } else { raw.len() });
        for &value in raw {
            if value > limit {
                break;
            }
            values.push(value * scalar);
            if negatives {
                values.push(-value * scalar);
            }
        }
        Self {
            zero_type,
            scalar,
            negatives,
            values,
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.values.len()
    }

    /// Largest magnitude in the sequence (0 when empty).
    pub fn max_abs(&self) -> f64 {
        self.values.iter().fold(0.0, |m, v| m.max(v.abs()))
    }

    pub fn spec(&self) -> ZerosSpec {
        ZerosSpec {
            zero_type: self.zero_type,
            scalar: self.scalar,
            negatives: self.negatives,
            count: self.count(),
        }
    }
}

/// Wire form of a ZLine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ZLineSpec {
    #[serde(with = "xy")]
    pub origin: Vec2,
    pub angle: f64,
    pub limit: f64,
    pub zeros: Vec<ZerosSpec>,
}

impl ZLineSpec {
    pub fn load(&self, store: &DataStore) -> Result<ZLine> {
        let zeros = self
            .zeros
            .iter()
            .map(|z| z.load(self.limit, store))
            .collect::<Result<Vec<_>>>()?;
        Ok(ZLine {
            origin: self.origin,
            angle: self.angle,
            limit: self.limit,
            zeros,
        })
    }
}

/// Number line anchored at `origin`, rotated by `angle` degrees. `limit` is
/// the load ceiling for `zeros`; the kernel's tangent cap is the session's
/// `distance_limit`.
#[derive(Clone, Debug, PartialEq)]
pub struct ZLine {
    pub origin: Vec2,
    pub angle: f64,
    pub limit: f64,
    pub zeros: Vec<Zeros>,
}

impl ZLine {
    pub fn new(
        origin: Vec2,
        zero_types: &[ZeroType],
        limit: f64,
        scalar: f64,
        negatives: bool,
        angle: f64,
        store: &DataStore,
    ) -> Result<Self> {
        let zeros = zero_types
            .iter()
            .map(|&zt| Zeros::load(zt, limit, scalar, negatives, store))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            origin,
            angle,
            limit,
            zeros,
        })
    }

    /// Largest zero magnitude across every sequence on the line.
    pub fn max_zero_val(&self) -> f64 {
        self.zeros.iter().map(Zeros::max_abs).fold(0.0, f64::max)
    }

    pub fn spec(&self) -> ZLineSpec {
        ZLineSpec {
            origin: self.origin,
            angle: self.angle,
            limit: self.limit,
            zeros: self.zeros.iter().map(Zeros::spec).collect(),
        }
    }
}
