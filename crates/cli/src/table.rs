//! Polars tables for scan results and kernel reference rows.

use anyhow::{bail, Context, Result};
use polars::prelude::*;
use reticle::{ScanResult, Vec2};
use std::fs::File;
use std::path::Path;

/// One result per row, in the given order.
pub fn results_frame(results: &[ScanResult]) -> PolarsResult<DataFrame> {
    let col = |f: fn(&ScanResult) -> f64| results.iter().map(f).collect::<Vec<f64>>();
    let ints = |f: fn(&ScanResult) -> u64| results.iter().map(f).collect::<Vec<u64>>();
    df!(
        "session_id" => results.iter().map(|r| r.session_id).collect::<Vec<i64>>(),
        "x" => col(|r| r.origin.x),
        "y" => col(|r| r.origin.y),
        "zero_type" => results.iter().map(|r| r.zero_type.to_string()).collect::<Vec<String>>(),
        "zeros_count" => ints(|r| r.zeros_count as u64),
        "zeros_hit" => ints(|r| r.zeros_hit as u64),
        "best_theta" => col(|r| r.best_theta),
        "best_bucket" => ints(|r| r.best_bucket as u64),
        "score" => col(|r| r.score),
        "slug" => results.iter().map(|r| r.slug.clone()).collect::<Vec<String>>(),
    )
}

/// Write `.csv` or `.parquet`, chosen by extension.
pub fn write_frame(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("parquet") => {
            ParquetWriter::new(file).finish(df)?;
        }
        Some("csv") | None => {
            let mut file = file;
            CsvWriter::new(&mut file).include_header(true).finish(df)?;
        }
        Some(other) => bail!("unsupported output extension .{other}"),
    }
    Ok(())
}

/// Row of a kernel reference table: `x,y,limit,buckets,theta,hits`.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceRow {
    pub origin: Vec2,
    pub limit: f64,
    pub buckets: usize,
    pub theta: f64,
    pub hits: usize,
}

pub fn read_reference(path: &Path) -> Result<Vec<ReferenceRow>> {
    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(Some(100))
        .finish()?
        .collect()
        .with_context(|| format!("reading {}", path.display()))?;
    let x = float_column(&df, "x")?;
    let y = float_column(&df, "y")?;
    let limit = float_column(&df, "limit")?;
    let theta = float_column(&df, "theta")?;
    let buckets = int_column(&df, "buckets")?;
    let hits = int_column(&df, "hits")?;
    Ok((0..df.height())
        .map(|i| ReferenceRow {
            origin: Vec2::new(x[i], y[i]),
            limit: limit[i],
            buckets: buckets[i],
            theta: theta[i],
            hits: hits[i],
        })
        .collect())
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let s = df
        .column(name)
        .with_context(|| format!("missing column {name}"))?
        .cast(&DataType::Float64)?;
    Ok(s.f64()?.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

fn int_column(df: &DataFrame, name: &str) -> Result<Vec<usize>> {
    let s = df
        .column(name)
        .with_context(|| format!("missing column {name}"))?
        .cast(&DataType::Int64)?;
    s.i64()?
        .into_iter()
        .map(|v| match v {
            Some(n) if n >= 0 => Ok(n as usize),
            _ => bail!("column {name} needs non-negative integers"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reticle::{LatticeParams, ZeroType};
    use tempfile::tempdir;

    fn result(score: f64) -> ScanResult {
        ScanResult {
            session_id: 5,
            origin: Vec2::new(0.5, -1.0),
            zero_type: ZeroType::Zeta,
            zeros_count: 20,
            zeros_hit: (score * 20.0) as usize,
            best_theta: 12.5,
            best_bucket: 125,
            lattice_params: LatticeParams::default(),
            score,
            slug: format!("5-{:02}-0-0", (score * 100.0) as i64),
        }
    }

    #[test]
    fn results_frame_has_one_row_per_result() {
        let df = results_frame(&[result(0.5), result(0.25)]).unwrap();
        assert_eq!(df.shape(), (2, 10));
        let scores: Vec<f64> = df.column("score").unwrap().f64().unwrap().into_no_null_iter().collect();
        assert_eq!(scores, vec![0.5, 0.25]);
    }

    #[test]
    fn csv_written_and_reference_read() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("nested/results.csv");
        let mut df = results_frame(&[result(0.5)]).unwrap();
        write_frame(&mut df, &out).unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.starts_with("session_id,x,y,zero_type"));

        let reference = dir.path().join("ref.csv");
        std::fs::write(&reference, "x,y,limit,buckets,theta,hits\n1.5,-2,100,3600,12.3,4\n").unwrap();
        let rows = read_reference(&reference).unwrap();
        assert_eq!(
            rows,
            vec![ReferenceRow {
                origin: Vec2::new(1.5, -2.0),
                limit: 100.0,
                buckets: 3600,
                theta: 12.3,
                hits: 4,
            }]
        );
    }

    #[test]
    fn unknown_extension_rejected() {
        let dir = tempdir().unwrap();
        let mut df = results_frame(&[]).unwrap();
        assert!(write_frame(&mut df, &dir.path().join("r.xlsx")).is_err());
    }
}
