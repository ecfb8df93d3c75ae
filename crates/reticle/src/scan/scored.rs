//! `ScoredResults`: background top-K drain over a result stream.
//!
//! Results are pushed with `add`. A worker thread keeps them in a max-heap by
//! score; on every tick the overflow beyond `depth` is popped (highest first)
//! and emitted as one batch. `close` flushes whatever remains in score order;
//! `stop` exits without flushing.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, tick, unbounded, Receiver, Sender};

use super::score::ScanResult;
use crate::error::{Result, ScanError};

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

enum Msg {
    Add(ScanResult),
    Close,
}

struct ByScore(ScanResult);

impl PartialEq for ByScore {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ByScore {}

impl PartialOrd for ByScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.score.total_cmp(&other.0.score)
    }
}

pub struct ScoredResults {
    input: Sender<Msg>,
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl ScoredResults {
    /// Spawn the drain; batches arrive on the returned receiver.
    pub fn spawn(depth: usize, period: Duration) -> Result<(Self, Receiver<Vec<ScanResult>>)> {
        Self::spawn_on(thread::Builder::new(), depth, period)
    }

    pub(crate) fn spawn_on(
        builder: thread::Builder,
        depth: usize,
        period: Duration,
    ) -> Result<(Self, Receiver<Vec<ScanResult>>)> {
        const NAME: &str = "scored-results";
        let (input, input_rx) = unbounded();
        let (stop, stop_rx) = crossbeam_channel::bounded(1);
        let (out_tx, out_rx) = unbounded();
        let handle = builder
            .name(NAME.into())
            .spawn(move || drain(depth, period, input_rx, stop_rx, out_tx))
            .map_err(|source| ScanError::Spawn {
                name: NAME.into(),
                source,
            })?;
        Ok((
            Self {
                input,
                stop,
                handle: Some(handle),
            },
            out_rx,
        ))
    }

    pub fn add(&self, result: ScanResult) {
        let _ = self.input.send(Msg::Add(result));
    }

    pub fn extend(&self, results: impl IntoIterator<Item = ScanResult>) {
        for r in results {
            self.add(r);
        }
    }

    /// Flush everything held, highest score first, and wait for the thread.
    pub fn close(mut self) {
        let _ = self.input.send(Msg::Close);
        self.join();
    }

    /// Exit without flushing.
    pub fn stop(mut self) {
        let _ = self.stop.send(());
        self.join();
    }

    fn join(&mut self) {
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                tracing::error!("scored-results thread panicked");
            }
        }
    }
}

impl Drop for ScoredResults {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop.send(());
            self.join();
        }
    }
}

fn drain(
    depth: usize,
    period: Duration,
    input: Receiver<Msg>,
    stop: Receiver<()>,
    out: Sender<Vec<ScanResult>>,
) {
    let ticker = tick(period);
    let mut heap: BinaryHeap<ByScore> = BinaryHeap::new();
    loop {
        select! {
            recv(input) -> msg => match msg {
                Ok(Msg::Add(r)) => heap.push(ByScore(r)),
                Ok(Msg::Close) | Err(_) => {
                    let rest: Vec<ScanResult> =
                        heap.into_sorted_vec().into_iter().rev().map(|b| b.0).collect();
                    if !rest.is_empty() {
                        let _ = out.send(rest);
                    }
                    return;
                }
            },
            recv(ticker) -> _ => {
                let mut batch = Vec::new();
                while heap.len() > depth {
                    if let Some(b) = heap.pop() {
                        batch.push(b.0);
                    }
                }
                if !batch.is_empty() {
                    tracing::debug!(emitted = batch.len(), held = heap.len(), "scored results tick");
                    let _ = out.send(batch);
                }
            },
            recv(stop) -> _ => return,
        }
    }
}
