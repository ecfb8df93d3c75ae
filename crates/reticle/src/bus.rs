//! Publish seam between session producers, scan workers and result sinks.
//!
//! Messages are JSON bodies on named topics:
//! - [`SESSION_TOPIC`]: one `SessionSpec` per message.
//! - [`RESULTS_TOPIC`]: one JSON array of `ScanResult` per worker batch.
//! - [`COMPLETE_TOPIC`]: one `SessionReport` after a run finishes.
//!
//! Delivery is at-most-once: a failed publish stops the session and the
//! batch in flight is dropped.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;

use crate::data::DataStore;
use crate::error::{Result, ScanError};
use crate::scan::{Session, SessionReport, SessionSpec};

pub const SESSION_TOPIC: &str = "scan-session";
pub const RESULTS_TOPIC: &str = "scan-radius-results";
pub const COMPLETE_TOPIC: &str = "scan-session-complete";

pub trait Publisher {
    fn publish(&self, topic: &str, body: &[u8]) -> Result<()>;
}

impl<P: Publisher + ?Sized> Publisher for &P {
    fn publish(&self, topic: &str, body: &[u8]) -> Result<()> {
        (**self).publish(topic, body)
    }
}

/// In-process bus: records every message in publish order.
#[derive(Debug, Default)]
pub struct MemoryBus {
    messages: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bodies published to `topic`, oldest first.
    pub fn messages(&self, topic: &str) -> Vec<Vec<u8>> {
        self.messages
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, b)| b.clone())
            .collect()
    }

    pub fn decode<T: DeserializeOwned>(&self, topic: &str) -> Result<Vec<T>> {
        self.messages(topic)
            .iter()
            .map(|b| serde_json::from_slice::<T>(b).map_err(ScanError::from))
            .collect()
    }

    /// Remove and return everything published so far.
    pub fn drain(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *self.messages.lock())
    }
}

impl Publisher for MemoryBus {
    fn publish(&self, topic: &str, body: &[u8]) -> Result<()> {
        self.messages.lock().push((topic.to_string(), body.to_vec()));
        Ok(())
    }
}

/// Start `session` and publish every batch to `topic`. Returns the number of
/// results published.
pub fn run_and_publish<P: Publisher + ?Sized>(
    session: &mut Session,
    publisher: &P,
    topic: &str,
) -> Result<usize> {
    let stream = session.start()?;
    let mut published = 0;
    for batch in stream {
        let body = serde_json::to_vec(&batch)?;
        if let Err(e) = publisher.publish(topic, &body) {
            tracing::warn!(session = session.id(), topic, error = %e, "publish failed; stopping session");
            session.stop();
            return Err(e);
        }
        published += batch.len();
    }
    tracing::info!(session = session.id(), topic, published, "session results published");
    Ok(published)
}

/// Worker-side handler for one `SESSION_TOPIC` message. Empty bodies are
/// skipped and yield `None`.
pub fn handle_session_message<P: Publisher + ?Sized>(
    body: &[u8],
    store: &DataStore,
    publisher: &P,
) -> Result<Option<SessionReport>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        tracing::debug!("skipping empty session message");
        return Ok(None);
    }
    let spec: SessionSpec = serde_json::from_slice(body)?;
    let mut session = spec.hydrate(store)?;
    tracing::info!(
        session = session.id(),
        scans = session.scans_req(),
        min_score = session.min_score(),
        "received session"
    );
    run_and_publish(&mut session, publisher, RESULTS_TOPIC)?;
    let report = session.report();
    publisher.publish(COMPLETE_TOPIC, &serde_json::to_vec(&report)?)?;
    Ok(Some(report))
}

/// One spec per partition origin of the session's lattice, ids counting up
/// from `base_id`.
pub fn partition_sessions(session: &Session, base_id: i64) -> Vec<SessionSpec> {
    let template = session.spec();
    session
        .lattice()
        .partition(session.radius())
        .into_iter()
        .enumerate()
        .map(|(i, origin)| {
            let mut spec = template.clone();
            spec.id = base_id + i as i64;
            spec.zline.origin = origin;
            spec
        })
        .collect()
}

/// Publish `partition_sessions` to [`SESSION_TOPIC`]; returns how many were sent.
pub fn publish_partition<P: Publisher + ?Sized>(
    session: &Session,
    base_id: i64,
    publisher: &P,
) -> Result<usize> {
    let specs = partition_sessions(session, base_id);
    for spec in &specs {
        publisher.publish(SESSION_TOPIC, &serde_json::to_vec(spec)?)?;
    }
    tracing::info!(base_id, sessions = specs.len(), "partition published");
    Ok(specs.len())
}
