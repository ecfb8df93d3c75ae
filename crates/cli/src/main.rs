use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use reticle::bus;
use reticle::scan::{calculate, wrap360};
use reticle::{DataStore, Lattice, LatticeType, Session, Vec2, VertexType, ZLine, ZeroType, Zeros};
use serde_json::json;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::EnvFilter;

mod lines;
mod provenance;
mod table;

use lines::LinePublisher;
use provenance::Payload;

#[derive(Parser)]
#[command(name = "reticle")]
#[command(about = "Lattice/zero-sequence angle scans")]
struct Cmd {
    /// Data root; defaults to $APP_DATA/$SCAN_DATA_PATH, then ./data
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Run one session locally and write its results table
    Scan {
        #[command(flatten)]
        session: SessionArgs,
        /// Output table (.csv or .parquet); a provenance sidecar lands next to it
        #[arg(long, default_value = "data/scans/results.csv")]
        out: PathBuf,
        #[arg(long)]
        tag: Option<String>,
    },
    /// Print one session spec per lattice partition origin, as JSON lines
    Partition {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long, default_value_t = 1)]
        base_id: i64,
    },
    /// Run JSON-line session specs from stdin; results and reports go to stdout
    Worker,
    /// Re-check reference hit counts (x,y,limit,buckets,theta,hits) with the kernel;
    /// `limit` is the tangent-length cap of each row
    Compare {
        #[arg(long)]
        reference: PathBuf,
        #[arg(long, default_value = "Pinwheel")]
        lattice: LatticeType,
        #[arg(long, default_value = "Vertices")]
        vertex: VertexType,
        #[arg(long, default_value = "Primes")]
        zeros: ZeroType,
        #[arg(long, default_value_t = 1.0)]
        scalar: f64,
        #[arg(long)]
        negatives: bool,
        /// Load ceiling for the zero sequence
        #[arg(long, default_value_t = 100.0)]
        max_zero: f64,
        /// Fail when any row disagrees
        #[arg(long)]
        strict: bool,
    },
    /// Write a square Grid lattice into the data root
    Grid {
        #[arg(long, default_value_t = 120.0)]
        half_extent: f64,
        #[arg(long, default_value_t = 1.0)]
        spacing: f64,
    },
    /// Print a provenance JSON block
    Report,
}

#[derive(Args, Clone, Debug)]
struct SessionArgs {
    /// Scan anchor as `x,y`
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true, default_value = "0,0")]
    origin: Vec2,
    #[arg(long, value_delimiter = ',', default_value = "Primes")]
    zeros: Vec<ZeroType>,
    /// Load ceiling for the zero sequences and tangent-distance cap
    #[arg(long, default_value_t = 100.0)]
    max_zero: f64,
    #[arg(long, default_value_t = 1.0)]
    scalar: f64,
    #[arg(long)]
    negatives: bool,
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    angle: f64,
    #[arg(long, default_value = "Pinwheel")]
    lattice: LatticeType,
    #[arg(long, default_value = "Vertices")]
    vertex: VertexType,
    #[arg(long, default_value_t = 1.0)]
    radius: f64,
    /// Tangent-length cap for a hit
    #[arg(long, default_value_t = 1.0)]
    distance_limit: f64,
    #[arg(long, default_value_t = 100)]
    scans: usize,
    #[arg(long, default_value_t = 3600)]
    buckets: usize,
    /// 0 keeps anything with at least one hit
    #[arg(long, default_value_t = 0.0)]
    min_score: f64,
    /// 0 takes a timestamp
    #[arg(long, default_value_t = 0)]
    id: i64,
    #[arg(long)]
    seed: Option<u64>,
    /// Worker threads; defaults to available parallelism
    #[arg(long)]
    procs: Option<usize>,
}

impl SessionArgs {
    fn build(&self, store: &DataStore) -> Result<Session> {
        let zline = ZLine::new(
            self.origin,
            &self.zeros,
            self.max_zero,
            self.scalar,
            self.negatives,
            self.angle,
            store,
        )
        .context("loading zero sequences")?;
        let lattice = Lattice::load(self.lattice, self.vertex, store).context("loading lattice")?;
        let mut session = Session::new(
            self.id,
            zline,
            lattice,
            self.radius,
            self.distance_limit,
            self.min_score,
            self.scans,
            self.buckets,
        )?;
        if let Some(seed) = self.seed {
            session = session.with_seed(seed);
        }
        if let Some(n) = self.procs {
            session = session.with_proc_count(n);
        }
        Ok(session)
    }

    fn params(&self) -> serde_json::Value {
        json!({
            "origin": [self.origin.x, self.origin.y],
            "zeros": self.zeros.iter().map(|z| z.as_str()).collect::<Vec<_>>(),
            "max_zero": self.max_zero,
            "scalar": self.scalar,
            "negatives": self.negatives,
            "angle": self.angle,
            "lattice": self.lattice.as_str(),
            "vertex": self.vertex.as_str(),
            "radius": self.radius,
            "distance_limit": self.distance_limit,
            "scans": self.scans,
            "buckets": self.buckets,
            "min_score": self.min_score,
            "seed": self.seed,
        })
    }
}

fn parse_point(s: &str) -> std::result::Result<Vec2, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got `{s}`"))?;
    let x: f64 = x.trim().parse().map_err(|e| format!("bad x in `{s}`: {e}"))?;
    let y: f64 = y.trim().parse().map_err(|e| format!("bad y in `{s}`: {e}"))?;
    Ok(Vec2::new(x, y))
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    SubscriberBuilder::default()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let cmd = Cmd::parse();
    let store = cmd.data.map(|p| DataStore::new(p)).unwrap_or_else(DataStore::from_env);
    match cmd.action {
        Action::Scan { session, out, tag } => scan(&store, &session, &out, tag),
        Action::Partition { session, base_id } => partition(&store, &session, base_id),
        Action::Worker => worker(&store),
        Action::Compare {
            reference,
            lattice,
            vertex,
            zeros,
            scalar,
            negatives,
            max_zero,
            strict,
        } => {
            let lattice = Lattice::load(lattice, vertex, &store).context("loading lattice")?;
            let check = CompareCfg {
                zero_type: zeros,
                max_zero,
                scalar,
                negatives,
            };
            let mismatches = compare(&store, &lattice, &reference, check)?;
            if strict && mismatches > 0 {
                bail!("{mismatches} reference rows disagree with the kernel");
            }
            Ok(())
        }
        Action::Grid {
            half_extent,
            spacing,
        } => grid(&store, half_extent, spacing),
        Action::Report => report(&store),
    }
}

fn scan(store: &DataStore, args: &SessionArgs, out: &Path, tag: Option<String>) -> Result<()> {
    let mut session = args.build(store)?;
    tracing::info!(session = session.id(), data = %store.root().display(), "scan");
    let mut results = session.start()?.collect_results();
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    let stats = session.stats();
    tracing::info!(
        session = session.id(),
        results = results.len(),
        filtered = session.filtered_count(),
        scans_per_sec = stats.scans_per_sec,
        "scan done"
    );

    let mut df = table::results_frame(&results)?;
    table::write_frame(&mut df, out)?;

    let mut params = args.params();
    params["session_id"] = json!(session.id());
    params["min_score_effective"] = json!(session.min_score());
    params["stats"] = serde_json::to_value(stats)?;
    params["state"] = serde_json::to_value(session.state())?;
    let mut payload = Payload::new(params);
    if let Some(tag) = tag {
        payload = payload.tagged(tag);
    }
    let prov = provenance::write_sidecar(out, payload)?;
    tracing::info!(out = %out.display(), provenance = %prov.display(), "wrote results");
    Ok(())
}

fn partition(store: &DataStore, args: &SessionArgs, base_id: i64) -> Result<()> {
    let session = args.build(store)?;
    let publisher = LinePublisher::bare(std::io::stdout().lock());
    let n = bus::publish_partition(&session, base_id, &publisher)?;
    tracing::info!(sessions = n, base_id, radius = session.radius(), "partition");
    Ok(())
}

fn worker(store: &DataStore) -> Result<()> {
    let publisher = LinePublisher::enveloped(std::io::stdout().lock());
    let mut failures = 0usize;
    for (n, line) in std::io::stdin().lock().lines().enumerate() {
        let line = line.context("reading stdin")?;
        match bus::handle_session_message(line.as_bytes(), store, &publisher) {
            Ok(Some(report)) => tracing::info!(
                line = n + 1,
                session = report.spec.id,
                state = ?report.state,
                scans_per_sec = report.stats.scans_per_sec,
                "session complete"
            ),
            Ok(None) => {}
            Err(e) => {
                failures += 1;
                tracing::error!(line = n + 1, error = %e, "session failed");
            }
        }
    }
    if failures > 0 {
        bail!("{failures} sessions failed");
    }
    Ok(())
}

#[derive(Clone, Copy, Debug)]
struct CompareCfg {
    zero_type: ZeroType,
    max_zero: f64,
    scalar: f64,
    negatives: bool,
}

/// Returns the number of rows whose hit count differs from the kernel's.
fn compare(store: &DataStore, lattice: &Lattice, reference: &Path, cfg: CompareCfg) -> Result<usize> {
    let rows = table::read_reference(reference)?;
    let zeros = Zeros::load(cfg.zero_type, cfg.max_zero, cfg.scalar, cfg.negatives, store)?;
    let mut mismatches = 0;
    for (i, row) in rows.iter().enumerate() {
        if row.buckets == 0 {
            bail!("row {}: buckets must be positive", i + 1);
        }
        let points = lattice.filter(row.origin, 0.0, zeros.max_abs(), row.limit);
        let m = calculate(row.origin, &points, zeros.values(), row.limit, row.buckets);
        let width = 360.0 / row.buckets as f64;
        let bucket = ((wrap360(row.theta) / width).round() as usize) % row.buckets;
        let got = m.hits(bucket);
        if got != row.hits {
            mismatches += 1;
            tracing::warn!(row = i + 1, bucket, expected = row.hits, got, "hit count differs");
        }
    }
    tracing::info!(rows = rows.len(), mismatches, "compare done");
    Ok(mismatches)
}

fn grid(store: &DataStore, half_extent: f64, spacing: f64) -> Result<()> {
    if !(spacing > 0.0) {
        bail!("spacing must be positive");
    }
    let lattice = Lattice::grid(half_extent, spacing);
    let path = lattice.save(store)?;
    let prov = provenance::write_sidecar(
        &path,
        Payload::new(json!({ "half_extent": half_extent, "spacing": spacing, "points": lattice.len() })),
    )?;
    tracing::info!(path = %path.display(), provenance = %prov.display(), points = lattice.len(), "grid lattice written");
    Ok(())
}

fn report(store: &DataStore) -> Result<()> {
    let doc = provenance::document(
        Payload::new(json!({ "data_root": store.root().to_string_lossy() })),
        &[],
    );
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn primes(max: u64) -> Vec<f64> {
        (2..=max)
            .filter(|&n| (2..).take_while(|d| d * d <= n).all(|d| n % d != 0))
            .map(|n| n as f64)
            .collect()
    }

    fn store_with_grid() -> (tempfile::TempDir, DataStore) {
        let dir = tempdir().unwrap();
        let store = DataStore::new(dir.path());
        store.write_zeros(ZeroType::Primes, &primes(200)).unwrap();
        grid(&store, 40.0, 1.0).unwrap();
        (dir, store)
    }

    #[test]
    fn parse_point_accepts_negatives() {
        assert_eq!(parse_point("-0.5, 2").unwrap(), Vec2::new(-0.5, 2.0));
        assert!(parse_point("1").is_err());
        assert!(parse_point("a,b").is_err());
    }

    #[test]
    fn session_flags_parse() {
        let cmd = Cmd::try_parse_from([
            "reticle", "scan", "--origin", "-0.4,-0.9", "--zeros", "primes,zeta", "--lattice", "grid",
            "--scans", "5", "--seed", "3",
        ])
        .unwrap();
        let Action::Scan { session, .. } = cmd.action else {
            panic!("expected scan");
        };
        assert_eq!(session.origin, Vec2::new(-0.4, -0.9));
        assert_eq!(session.zeros, vec![ZeroType::Primes, ZeroType::Zeta]);
        assert_eq!(session.lattice, LatticeType::Grid);
        assert_eq!(session.seed, Some(3));
    }

    #[test]
    fn scan_writes_table_and_sidecar() {
        let (dir, store) = store_with_grid();
        let cmd = Cmd::try_parse_from([
            "reticle", "scan", "--lattice", "grid", "--max-zero", "30", "--scans", "4", "--buckets", "360",
            "--seed", "1", "--procs", "2",
        ])
        .unwrap();
        let Action::Scan { session, .. } = cmd.action else {
            panic!("expected scan");
        };
        let out = dir.path().join("out/results.csv");
        scan(&store, &session, &out, Some("test".into())).unwrap();
        assert!(out.exists());
        assert!(provenance::provenance_path(&out).exists());
    }

    #[test]
    fn compare_agrees_with_kernel() {
        let (dir, store) = store_with_grid();
        let lattice = Lattice::load(LatticeType::Grid, VertexType::Vertices, &store).unwrap();
        let origin = Vec2::new(0.3, -0.2);
        let zeros = Zeros::load(ZeroType::Primes, 30.0, 1.0, false, &store).unwrap();
        let m = calculate(origin, lattice.points(), zeros.values(), 1.0, 360);
        let best = reticle::scan::best_buckets(&m)[0];

        let reference = dir.path().join("ref.csv");
        std::fs::write(
            &reference,
            format!(
                "x,y,limit,buckets,theta,hits\n0.3,-0.2,1,360,{},{}\n0.3,-0.2,1,360,{},{}\n",
                best.theta,
                best.hits,
                best.theta,
                best.hits + 1
            ),
        )
        .unwrap();
        let cfg = CompareCfg {
            zero_type: ZeroType::Primes,
            max_zero: 30.0,
            scalar: 1.0,
            negatives: false,
        };
        assert_eq!(compare(&store, &lattice, &reference, cfg).unwrap(), 1);
    }
}
