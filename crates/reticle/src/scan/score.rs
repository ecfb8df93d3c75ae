//! Bucket tallies, best-bucket selection and `ScanResult` construction.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::kernel::BucketMatrix;
use crate::geom::{xy, Vec2};
use crate::lattice::LatticeParams;
use crate::zeros::ZeroType;

/// Tally of distinct zeros hit in one bucket.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BucketHits {
    pub bucket: usize,
    pub hits: usize,
    /// Lower edge of the bucket in degrees.
    pub theta: f64,
}

impl fmt::Display for BucketHits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bucket:{} hits:{} theta:{}", self.bucket, self.hits, self.theta)
    }
}

/// Per-bucket tallies, most hits first; equal tallies keep bucket order.
pub fn count_hits(buckets: &BucketMatrix) -> Vec<BucketHits> {
    let n = buckets.bucket_count();
    let deg_per_bucket = 360.0 / n as f64;
    let mut hits: Vec<BucketHits> = (0..n)
        .map(|i| BucketHits {
            bucket: i,
            hits: buckets.hits(i),
            theta: i as f64 * deg_per_bucket,
        })
        .collect();
    hits.sort_by(|a, b| b.hits.cmp(&a.hits));
    hits
}

/// Every bucket tied with the maximum tally.
pub fn best_buckets(buckets: &BucketMatrix) -> Vec<BucketHits> {
    let hits = count_hits(buckets);
    let Some(best) = hits.first().map(|h| h.hits) else {
        return Vec::new();
    };
    hits.into_iter().take_while(|h| h.hits == best).collect()
}

/// Rounding scale `10^(2·digits(bucket_count))`.
pub fn score_precision(bucket_count: usize) -> f64 {
    let digits = bucket_count.to_string().len() as i32;
    10f64.powi(2 * digits)
}

/// One best bucket for one origin, ready for the result stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScanResult {
    #[serde(rename = "SessionID")]
    pub session_id: i64,
    #[serde(with = "xy")]
    pub origin: Vec2,
    pub zero_type: ZeroType,
    pub zeros_count: usize,
    pub zeros_hit: usize,
    pub best_theta: f64,
    pub best_bucket: usize,
    #[serde(default)]
    pub lattice_params: LatticeParams,
    pub score: f64,
    pub slug: String,
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Result] session:{} score:{} hits:{} zeros:{} theta:{} bucket:{} origin:({}, {}) {}",
            self.session_id,
            self.score,
            self.zeros_hit,
            self.zeros_count,
            self.best_theta,
            self.best_bucket,
            self.origin.x,
            self.origin.y,
            self.zero_type
        )
    }
}

/// Debug key `{session}-{score%:02}-{proc}-{origin}`; not unique across ties.
pub(crate) fn slug(session_id: i64, score: f64, proc_id: usize, origin_id: usize) -> String {
    let pct = (score * 100.0) as i64;
    format!("{session_id}-{pct:02}-{proc_id}-{origin_id}")
}

/// `hits / zero_count` rounded to [`score_precision`].
pub fn round_score(hits: usize, zero_count: usize, bucket_count: usize) -> f64 {
    if zero_count == 0 {
        return 0.0;
    }
    let p = score_precision(bucket_count);
    (hits as f64 / zero_count as f64 * p).round() / p
}

/// Score a best bucket as `hits / zero_count`, trimmed to the precision the
/// bucket resolution supports.
#[allow(clippy::too_many_arguments)]
pub fn create_result(
    session_id: i64,
    proc_id: usize,
    origin_id: usize,
    bucket_count: usize,
    origin: Vec2,
    zero_type: ZeroType,
    zero_count: usize,
    hits: BucketHits,
    lattice_params: &LatticeParams,
) -> ScanResult {
    let p = score_precision(bucket_count);
    let score = round_score(hits.hits, zero_count, bucket_count);
    let theta = (hits.theta * p).round() / p;
    ScanResult {
        session_id,
        origin,
        zero_type,
        zeros_count: zero_count,
        zeros_hit: hits.hits,
        best_theta: theta,
        best_bucket: hits.bucket,
        lattice_params: lattice_params.clone(),
        score,
        slug: slug(session_id, score, proc_id, origin_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // buckets x zeros, 1 = hit
    fn matrix(rows: &[&[u8]]) -> BucketMatrix {
        let zeros = rows.first().map_or(0, |r| r.len());
        let mut m = BucketMatrix::new(rows.len(), zeros);
        for (b, row) in rows.iter().enumerate() {
            for (z, &v) in row.iter().enumerate() {
                if v == 1 {
                    m.set(b, z);
                }
            }
        }
        m
    }

    #[test]
    fn count_hits_sorted_descending() {
        let m = matrix(&[&[0, 1, 0], &[1, 1, 1], &[1, 0, 0], &[0, 0, 0]]);
        let hits = count_hits(&m);
        let tallies: Vec<usize> = hits.iter().map(|h| h.hits).collect();
        assert_eq!(tallies, vec![3, 1, 1, 0]);
        assert_eq!(hits[0].bucket, 1);
        assert_eq!(hits[0].theta, 90.0);
        // ties keep bucket order
        assert_eq!((hits[1].bucket, hits[2].bucket), (0, 2));
    }

    #[test]
    fn best_buckets_reports_every_tie() {
        let m = matrix(&[&[1, 1, 0], &[0, 0, 1], &[1, 0, 1], &[0, 0, 0]]);
        let best = best_buckets(&m);
        assert_eq!(best.len(), 2);
        let buckets: Vec<usize> = best.iter().map(|b| b.bucket).collect();
        assert_eq!(buckets, vec![0, 2]);
        assert!(best.iter().all(|b| b.hits == 2));
    }

    #[test]
    fn best_buckets_single_winner() {
        let m = matrix(&[&[1, 0], &[1, 1]]);
        let best = best_buckets(&m);
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].bucket, 1);
    }

    #[test]
    fn best_buckets_with_no_hits_ties_everything() {
        let m = matrix(&[&[0, 0], &[0, 0], &[0, 0]]);
        assert_eq!(best_buckets(&m).len(), 3);
        assert!(best_buckets(&BucketMatrix::new(0, 4)).is_empty());
    }

    #[test]
    fn precision_follows_bucket_digits() {
        assert_eq!(score_precision(9), 1e2);
        assert_eq!(score_precision(360), 1e6);
        assert_eq!(score_precision(3600), 1e8);
    }

    #[test]
    fn create_result_rounds_and_slugs() {
        let hits = BucketHits {
            bucket: 1234,
            hits: 1,
            theta: 1234.0 * 0.1,
        };
        let r = create_result(
            42,
            3,
            17,
            3600,
            Vec2::new(0.5, -0.25),
            ZeroType::Primes,
            3,
            hits,
            &LatticeParams::default(),
        );
        assert_eq!(r.score, 0.33333333);
        assert_eq!(r.best_theta, 123.4);
        assert_eq!(r.zeros_hit, 1);
        assert_eq!(r.zeros_count, 3);
        assert_eq!(r.slug, "42-33-3-17");
        assert!(r.score >= 0.0 && r.score <= 1.0);
    }

    #[test]
    fn slug_pads_low_scores() {
        assert_eq!(slug(7, 0.04, 0, 1), "7-04-0-1");
        assert_eq!(slug(7, 1.0, 2, 9), "7-100-2-9");
    }

    #[test]
    fn result_wire_names() {
        let r = create_result(
            1,
            0,
            0,
            360,
            Vec2::new(1.0, 2.0),
            ZeroType::Zeta,
            4,
            BucketHits {
                bucket: 0,
                hits: 4,
                theta: 0.0,
            },
            &LatticeParams::default(),
        );
        let v: serde_json::Value = serde_json::to_value(&r).unwrap();
        for key in [
            "SessionID",
            "Origin",
            "ZeroType",
            "ZerosCount",
            "ZerosHit",
            "BestTheta",
            "BestBucket",
            "LatticeParams",
            "Score",
            "Slug",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
        assert_eq!(v["Origin"]["X"], 1.0);
        assert_eq!(v["Score"], 1.0);
        let back: ScanResult = serde_json::from_value(v).unwrap();
        assert_eq!(back, r);
    }
}
