//! JSON-lines publisher: the stdout stand-in for the message bus.

use parking_lot::Mutex;
use reticle::bus::Publisher;
use reticle::ScanError;
use std::io::Write;

pub struct LinePublisher<W: Write> {
    out: Mutex<W>,
    envelope: bool,
}

impl<W: Write> LinePublisher<W> {
    /// Bodies only, one per line.
    pub fn bare(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            envelope: false,
        }
    }

    /// `{"topic": .., "message": <body>}` per line.
    pub fn enveloped(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            envelope: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write> Publisher for LinePublisher<W> {
    fn publish(&self, topic: &str, body: &[u8]) -> reticle::Result<()> {
        let fail = |reason: String| ScanError::Publish {
            topic: topic.to_string(),
            reason,
        };
        let mut out = self.out.lock();
        if self.envelope {
            let message: serde_json::Value =
                serde_json::from_slice(body).map_err(|e| fail(e.to_string()))?;
            let line = serde_json::json!({ "topic": topic, "message": message });
            serde_json::to_writer(&mut *out, &line).map_err(|e| fail(e.to_string()))?;
        } else {
            out.write_all(body).map_err(|e| fail(e.to_string()))?;
        }
        out.write_all(b"\n").map_err(|e| fail(e.to_string()))?;
        out.flush().map_err(|e| fail(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_lines() {
        let p = LinePublisher::bare(Vec::new());
        p.publish("scan-session", br#"{"ID":1}"#).unwrap();
        p.publish("scan-session", br#"{"ID":2}"#).unwrap();
        assert_eq!(String::from_utf8(p.into_inner()).unwrap(), "{\"ID\":1}\n{\"ID\":2}\n");
    }

    #[test]
    fn enveloped_lines_keep_topic() {
        let p = LinePublisher::enveloped(Vec::new());
        p.publish("scan-radius-results", b"[1,2]").unwrap();
        let text = String::from_utf8(p.into_inner()).unwrap();
        let v: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(v["topic"], "scan-radius-results");
        assert_eq!(v["message"], serde_json::json!([1, 2]));
    }

    #[test]
    fn non_json_body_fails_in_envelope() {
        let p = LinePublisher::enveloped(Vec::new());
        assert!(p.publish("t", b"not json").is_err());
    }
}
