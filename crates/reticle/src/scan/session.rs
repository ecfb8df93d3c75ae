//! `Session`: one scan request and the worker pool that executes it.
//!
//! Lifecycle
//! - `Built` after `new`/`hydrate`; `start` moves to `Running` and returns a
//!   [`ScanStream`] of result batches.
//! - A coordinator thread joins every worker, records stats, sets
//!   `Completed` or `Cancelled`, and only then closes the stream.
//! - `stop` fires the cancel token; workers poll it between origins.
//!
//! Wire form is [`SessionSpec`]; it never carries lattice points or zero
//! values, which are reloaded from a `DataStore` on the receiving side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::kernel::{calculate, rand_origins};
use super::score::{best_buckets, create_result, round_score, ScanResult};
use crate::data::DataStore;
use crate::error::{Result, ScanError};
use crate::geom::Vec2;
use crate::lattice::{Lattice, LatticeParams, LatticeSpec};
use crate::zeros::{ZLine, ZLineSpec, ZeroType};

/// Results per batch sent on the stream.
pub const BATCH_SIZE: usize = 10;

/// How often a worker blocked on a full stream rechecks its cancel token.
const SEND_POLL: Duration = Duration::from_millis(50);

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Built,
    Running,
    Completed,
    Cancelled,
}

impl SessionState {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionStats {
    pub scans_per_sec: u64,
    pub total_time: Duration,
}

/// How bucket tallies become a score.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringMode {
    /// Hits against the first sequence on the ZLine.
    #[default]
    SingleSequence,
    /// Hits on one sequence minus hits on a second; not implemented.
    DifferentialPair,
}

#[derive(Debug, Default)]
struct Progress {
    state: SessionState,
    stats: SessionStats,
}

/// Wire form of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionSpec {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "ZLine")]
    pub zline: ZLineSpec,
    pub lattice: LatticeSpec,
    pub radius: f64,
    pub distance_limit: f64,
    pub bucket_count: usize,
    pub scans_req: usize,
    pub min_score: f64,
    #[serde(default)]
    pub scoring_mode: ScoringMode,
}

impl SessionSpec {
    /// Reload geometry and sequences for a spec received off the wire.
    pub fn hydrate(&self, store: &DataStore) -> Result<Session> {
        let zline = self.zline.load(store)?;
        let lattice = self.lattice.load(store)?;
        validate(&zline, self.bucket_count)?;
        Ok(Session {
            id: self.id,
            zline,
            lattice,
            radius: self.radius,
            distance_limit: self.distance_limit,
            min_score: self.min_score,
            scans_req: self.scans_req,
            bucket_count: self.bucket_count,
            mode: self.scoring_mode,
            seed: None,
            proc_count: default_proc_count(),
            cancel: CancelToken::new(),
            progress: Arc::new(Mutex::new(Progress::default())),
            filtered: 0,
        })
    }
}

/// Spec plus the outcome of a run; published once a session finishes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionReport {
    #[serde(flatten)]
    pub spec: SessionSpec,
    pub stats: SessionStats,
    pub state: SessionState,
    pub filtered: usize,
}

pub struct Session {
    id: i64,
    zline: ZLine,
    lattice: Lattice,
    radius: f64,
    distance_limit: f64,
    min_score: f64,
    scans_req: usize,
    bucket_count: usize,
    mode: ScoringMode,
    seed: Option<u64>,
    proc_count: usize,
    cancel: CancelToken,
    progress: Arc<Mutex<Progress>>,
    filtered: usize,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("radius", &self.radius)
            .field("distance_limit", &self.distance_limit)
            .field("min_score", &self.min_score)
            .field("scans_req", &self.scans_req)
            .field("bucket_count", &self.bucket_count)
            .field("proc_count", &self.proc_count)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Build a session. `id == 0` takes a nanosecond timestamp and
    /// `min_score == 0` becomes the rounded score of a single hit on the
    /// first sequence, so every result with a hit is kept.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: i64,
        zline: ZLine,
        lattice: Lattice,
        radius: f64,
        distance_limit: f64,
        min_score: f64,
        scans_req: usize,
        bucket_count: usize,
    ) -> Result<Self> {
        validate(&zline, bucket_count)?;
        let id = if id == 0 { now_nanos() } else { id };
        let min_score = if min_score == 0.0 {
            round_score(1, zline.zeros[0].count(), bucket_count)
        } else {
            min_score
        };
        Ok(Self {
            id,
            zline,
            lattice,
            radius,
            distance_limit,
            min_score,
            scans_req,
            bucket_count,
            mode: ScoringMode::default(),
            seed: None,
            proc_count: default_proc_count(),
            cancel: CancelToken::new(),
            progress: Arc::new(Mutex::new(Progress::default())),
            filtered: 0,
        })
    }

    /// Fix per-worker origin draws so a run can be repeated.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_proc_count(mut self, n: usize) -> Self {
        self.proc_count = n.max(1);
        self
    }

    pub fn with_scoring_mode(mut self, mode: ScoringMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn zline(&self) -> &ZLine {
        &self.zline
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn distance_limit(&self) -> f64 {
        self.distance_limit
    }

    pub fn min_score(&self) -> f64 {
        self.min_score
    }

    pub fn scans_req(&self) -> usize {
        self.scans_req
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    pub fn proc_count(&self) -> usize {
        self.proc_count
    }

    pub fn state(&self) -> SessionState {
        self.progress.lock().state
    }

    pub fn stats(&self) -> SessionStats {
        self.progress.lock().stats
    }

    /// Lattice points kept by the last `start`.
    pub fn filtered_count(&self) -> usize {
        self.filtered
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn spec(&self) -> SessionSpec {
        SessionSpec {
            id: self.id,
            zline: self.zline.spec(),
            lattice: self.lattice.spec(),
            radius: self.radius,
            distance_limit: self.distance_limit,
            bucket_count: self.bucket_count,
            scans_req: self.scans_req,
            min_score: self.min_score,
            scoring_mode: self.mode,
        }
    }

    pub fn report(&self) -> SessionReport {
        let progress = self.progress.lock();
        SessionReport {
            spec: self.spec(),
            stats: progress.stats,
            state: progress.state,
            filtered: self.filtered,
        }
    }

    /// Reload points and values, reset the pool size to local parallelism and
    /// issue a fresh cancel token.
    pub fn restore(&mut self, store: &DataStore) -> Result<()> {
        self.zline = self.zline.spec().load(store)?;
        self.lattice = self.lattice.spec().load(store)?;
        validate(&self.zline, self.bucket_count)?;
        self.proc_count = default_proc_count();
        self.cancel = CancelToken::new();
        Ok(())
    }

    /// Fire the cancel token. Does not wait for workers.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Filter the lattice, spawn the worker pool and return the result stream.
    pub fn start(&mut self) -> Result<ScanStream> {
        if self.mode == ScoringMode::DifferentialPair {
            return Err(ScanError::Unsupported("differential pair scoring"));
        }
        if self.state() == SessionState::Running {
            return Err(ScanError::invalid(format!("session {} is already running", self.id)));
        }

        let points: Arc<[Vec2]> = self
            .lattice
            .filter(
                self.zline.origin,
                self.radius,
                self.zline.max_zero_val(),
                self.distance_limit,
            )
            .into();
        self.filtered = points.len();
        self.cancel = CancelToken::new();

        let first = &self.zline.zeros[0];
        let job = Arc::new(Job {
            session_id: self.id,
            center: self.zline.origin,
            radius: self.radius,
            distance_limit: self.distance_limit,
            bucket_count: self.bucket_count,
            min_score: self.min_score,
            zero_type: first.zero_type,
            zeros: first.values().into(),
            points,
            lattice_params: self.lattice.parameters.clone(),
        });

        {
            let mut progress = self.progress.lock();
            progress.state = SessionState::Running;
            progress.stats = SessionStats::default();
        }
        tracing::info!(
            session = self.id,
            filtered = self.filtered,
            zeros = job.zeros.len(),
            scans = self.scans_req,
            workers = self.proc_count,
            "session started"
        );

        let (tx, rx) = bounded(self.scans_req.max(1));
        let started = Instant::now();
        let mut handles = Vec::with_capacity(self.proc_count);
        for (proc_id, count) in split_scans(self.scans_req, self.proc_count).into_iter().enumerate() {
            let job = Arc::clone(&job);
            let tx = tx.clone();
            let cancel = self.cancel.clone();
            let rng = worker_rng(self.seed, proc_id);
            let handle = thread::Builder::new()
                .name(format!("scan-{}-w{}", self.id, proc_id))
                .spawn(move || run_worker(&job, proc_id, count, rng, &tx, &cancel))
                .map_err(|e| self.abort_start(format!("scan-{}-w{}", self.id, proc_id), e))?;
            handles.push(handle);
        }

        let coordinator = Coordinator {
            session_id: self.id,
            scans_req: self.scans_req,
            started,
            cancel: self.cancel.clone(),
            progress: Arc::clone(&self.progress),
        };
        thread::Builder::new()
            .name(format!("scan-{}-coord", self.id))
            .spawn(move || coordinator.run(handles, tx))
            .map_err(|e| self.abort_start(format!("scan-{}-coord", self.id), e))?;

        Ok(ScanStream { rx })
    }

    /// Undo a partial `start`: stop spawned workers and fall back to `Built`.
    fn abort_start(&self, name: String, source: std::io::Error) -> ScanError {
        self.cancel.cancel();
        self.progress.lock().state = SessionState::Built;
        tracing::error!(session = self.id, thread = %name, error = %source, "session start failed");
        ScanError::Spawn { name, source }
    }
}

/// Result batches from a running session; ends once every worker is done.
pub struct ScanStream {
    rx: Receiver<Vec<ScanResult>>,
}

impl ScanStream {
    /// Drain the stream into a flat list.
    pub fn collect_results(self) -> Vec<ScanResult> {
        self.flatten().collect()
    }
}

impl Iterator for ScanStream {
    type Item = Vec<ScanResult>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}

/// Read-only inputs shared by every worker of one run.
struct Job {
    session_id: i64,
    center: Vec2,
    radius: f64,
    /// Tangent-length cap for the kernel; also the filter's lateral reach.
    distance_limit: f64,
    bucket_count: usize,
    min_score: f64,
    zero_type: ZeroType,
    zeros: Arc<[f64]>,
    points: Arc<[Vec2]>,
    lattice_params: LatticeParams,
}

struct Coordinator {
    session_id: i64,
    scans_req: usize,
    started: Instant,
    cancel: CancelToken,
    progress: Arc<Mutex<Progress>>,
}

impl Coordinator {
    fn run(self, handles: Vec<thread::JoinHandle<usize>>, tx: Sender<Vec<ScanResult>>) {
        let mut sent = 0;
        for handle in handles {
            match handle.join() {
                Ok(n) => sent += n,
                Err(_) => {
                    tracing::error!(session = self.session_id, "scan worker panicked");
                    std::process::abort();
                }
            }
        }
        let total_time = self.started.elapsed();
        let secs = total_time.as_secs_f64();
        let scans_per_sec = if secs > 0.0 {
            (self.scans_req as f64 / secs).round() as u64
        } else {
            0
        };
        let state = if self.cancel.is_cancelled() {
            SessionState::Cancelled
        } else {
            SessionState::Completed
        };
        {
            let mut progress = self.progress.lock();
            progress.stats = SessionStats {
                scans_per_sec,
                total_time,
            };
            progress.state = state;
        }
        tracing::info!(
            session = self.session_id,
            results = sent,
            scans_per_sec,
            ?total_time,
            ?state,
            "session finished"
        );
        drop(tx);
    }
}

/// Scan `count` origins; returns the number of results sent.
fn run_worker(
    job: &Job,
    proc_id: usize,
    count: usize,
    mut rng: StdRng,
    tx: &Sender<Vec<ScanResult>>,
    cancel: &CancelToken,
) -> usize {
    let origins = rand_origins(&mut rng, job.radius, job.center, count);
    let sent = scan_origins(job, proc_id, origins.into_iter().enumerate(), tx, cancel);
    tracing::debug!(session = job.session_id, worker = proc_id, origins = count, sent, "worker done");
    sent
}

/// Kernel + scoring over `(origin_id, origin)` pairs. On cancel, results of
/// origins already scanned are still sent.
fn scan_origins(
    job: &Job,
    proc_id: usize,
    origins: impl Iterator<Item = (usize, Vec2)>,
    tx: &Sender<Vec<ScanResult>>,
    cancel: &CancelToken,
) -> usize {
    let mut batch = Vec::with_capacity(BATCH_SIZE);
    let mut sent = 0;
    for (origin_id, origin) in origins {
        if cancel.is_cancelled() {
            tracing::debug!(session = job.session_id, worker = proc_id, origin_id, "worker cancelled");
            break;
        }
        let buckets = calculate(origin, &job.points, &job.zeros, job.distance_limit, job.bucket_count);
        for best in best_buckets(&buckets) {
            let result = create_result(
                job.session_id,
                proc_id,
                origin_id,
                job.bucket_count,
                origin,
                job.zero_type,
                job.zeros.len(),
                best,
                &job.lattice_params,
            );
            if result.score >= job.min_score {
                batch.push(result);
            }
        }
        if batch.len() >= BATCH_SIZE {
            let n = batch.len();
            if !send_batch(tx, std::mem::take(&mut batch), cancel) {
                return sent;
            }
            sent += n;
        }
    }
    if !batch.is_empty() {
        let n = batch.len();
        if send_batch(tx, batch, cancel) {
            sent += n;
        }
    }
    sent
}

/// Blocking send that gives up on cancel or a dropped stream.
fn send_batch(tx: &Sender<Vec<ScanResult>>, mut batch: Vec<ScanResult>, cancel: &CancelToken) -> bool {
    loop {
        match tx.send_timeout(batch, SEND_POLL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(b)) => {
                if cancel.is_cancelled() {
                    return false;
                }
                batch = b;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

/// Even split; the remainder goes to the first workers.
pub(crate) fn split_scans(scans: usize, workers: usize) -> Vec<usize> {
    let workers = workers.max(1);
    let (base, rem) = (scans / workers, scans % workers);
    (0..workers).map(|i| base + usize::from(i < rem)).collect()
}

fn worker_rng(seed: Option<u64>, proc_id: usize) -> StdRng {
    fn mix(mut x: u64) -> u64 {
        x ^= x >> 30;
        x = x.wrapping_mul(0xbf58476d1ce4e5b9);
        x ^= x >> 27;
        x = x.wrapping_mul(0x94d049bb133111eb);
        x ^ (x >> 31)
    }
    match seed {
        Some(seed) => {
            let k = mix(seed ^ mix((proc_id as u64).wrapping_add(0x9e3779b97f4a7c15)));
            StdRng::seed_from_u64(k)
        }
        None => StdRng::from_entropy(),
    }
}

fn validate(zline: &ZLine, bucket_count: usize) -> Result<()> {
    let Some(first) = zline.zeros.first() else {
        return Err(ScanError::invalid("zline has no zero sequences"));
    };
    if first.count() == 0 {
        return Err(ScanError::invalid(format!(
            "{} sequence is empty below limit {}",
            first.zero_type, zline.limit
        )));
    }
    if bucket_count == 0 {
        return Err(ScanError::invalid("bucket count must be positive"));
    }
    Ok(())
}

fn default_proc_count() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(1)
}

#[cfg(test)]
mod unit {
    use super::*;

    #[test]
    fn split_gives_remainder_to_first_workers() {
        assert_eq!(split_scans(10, 3), vec![4, 3, 3]);
        assert_eq!(split_scans(2, 4), vec![1, 1, 0, 0]);
        assert_eq!(split_scans(0, 2), vec![0, 0]);
        assert_eq!(split_scans(5, 0), vec![5]);
        assert_eq!(split_scans(1000, 7).iter().sum::<usize>(), 1000);
    }

    #[test]
    fn seeded_worker_rngs_differ_per_worker() {
        use rand::Rng;
        let a: u64 = worker_rng(Some(9), 0).gen();
        let b: u64 = worker_rng(Some(9), 1).gen();
        let a2: u64 = worker_rng(Some(9), 0).gen();
        assert_eq!(a, a2);
        assert_ne!(a, b);
    }

    fn small_job() -> Job {
        let points: Vec<Vec2> = (-8..=8)
            .flat_map(|i| (-8..=8).map(move |j| Vec2::new(i as f64, j as f64)))
            .collect();
        Job {
            session_id: 9,
            center: Vec2::zeros(),
            radius: 0.5,
            distance_limit: 1.0,
            bucket_count: 360,
            min_score: 0.0,
            zero_type: ZeroType::Primes,
            zeros: vec![2.0, 3.0, 5.0].into(),
            points: points.into(),
            lattice_params: LatticeParams::default(),
        }
    }

    #[test]
    fn cancel_still_sends_finished_origins() {
        let job = small_job();
        let (tx, rx) = bounded(4);
        let cancel = CancelToken::new();
        let origins = [Vec2::new(0.1, 0.2), Vec2::new(-0.3, 0.1), Vec2::new(0.2, -0.2)];
        let trip = cancel.clone();
        let feed = origins.into_iter().enumerate().inspect(move |&(i, _)| {
            if i == 1 {
                trip.cancel();
            }
        });
        let sent = scan_origins(&job, 0, feed, &tx, &cancel);
        drop(tx);
        let got: Vec<ScanResult> = rx.iter().flatten().collect();
        assert!(sent > 0);
        assert_eq!(got.len(), sent);
        assert!(got.iter().all(|r| r.slug.ends_with("-0-0")));
    }

    #[test]
    fn failed_start_returns_to_built() {
        let (_dir, store) = crate::testutil::synthetic_store();
        let zline = ZLine::new(Vec2::zeros(), &[ZeroType::Primes], 20.0, 1.0, false, 0.0, &store).unwrap();
        let lattice = Lattice::grid(30.0, 1.0);
        let mut s = Session::new(4, zline, lattice, 1.0, 1.0, 0.0, 2, 360)
            .unwrap()
            .with_proc_count(1);
        s.progress.lock().state = SessionState::Running;
        let err = s.abort_start("scan-4-w0".into(), std::io::Error::other("no threads"));
        assert!(matches!(err, ScanError::Spawn { .. }));
        assert_eq!(s.state(), SessionState::Built);
        assert!(s.cancel_token().is_cancelled());
        let _ = s.start().unwrap().collect_results();
        assert_eq!(s.state(), SessionState::Completed);
    }

    #[test]
    fn default_min_score_keeps_single_hits() {
        let (_dir, store) = crate::testutil::synthetic_store();
        // primes <= 17: seven values, 1/7 does not survive rounding unchanged
        let zline = ZLine::new(Vec2::zeros(), &[ZeroType::Primes], 17.0, 1.0, false, 0.0, &store).unwrap();
        assert_eq!(zline.zeros[0].count(), 7);
        let s = Session::new(4, zline, Lattice::grid(30.0, 1.0), 1.0, 1.0, 0.0, 1, 3600).unwrap();
        let one_hit = round_score(1, 7, 3600);
        assert_eq!(s.min_score(), one_hit);
        assert!(s.min_score() < 1.0 / 7.0);
    }

    #[test]
    fn cancel_token_is_shared() {
        let t = CancelToken::new();
        let c = t.clone();
        assert!(!c.is_cancelled());
        t.cancel();
        assert!(c.is_cancelled());
    }
}
