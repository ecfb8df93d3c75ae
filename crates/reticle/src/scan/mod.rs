//! Scan engine: per-origin angle-bucket kernel, result scoring, and the
//! `Session` orchestrator that fans origins across a worker pool.
//!
//! Flow
//! - `Session::start` filters the lattice once, spawns `proc_count` worker
//!   threads, and returns a `ScanStream` of result batches.
//! - Each worker draws random origins, runs [`calculate`] against the first
//!   zero sequence, keeps [`best_buckets`] scoring at least `min_score`.
//! - `ScoredResults` is an optional downstream top-K drain.
//!
//! Code cross-refs: `lattice::Lattice::filter`, `zeros::ZLine`, `bus::run_and_publish`

mod kernel;
mod score;
mod scored;
mod session;

pub use kernel::{all_angles, calculate, rand_origins, wrap360, BucketMatrix};
pub use score::{
    best_buckets, count_hits, create_result, round_score, score_precision, BucketHits, ScanResult,
};
pub use scored::{ScoredResults, DEFAULT_TICK};
pub use session::{
    CancelToken, ScanStream, ScoringMode, Session, SessionReport, SessionSpec, SessionState,
    SessionStats, BATCH_SIZE,
};
