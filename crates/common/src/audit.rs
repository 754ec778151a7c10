//! Append-only, hash-chained audit trail
//!
//! Every event appended to `audit/events.ndjson` carries the digest of the
//! event before it, and its own digest over `(prevDigest, event content)`.
//! Editing, reordering or deleting any line breaks the chain from that point
//! on, which [`AuditTrail::verify`] reports. `audit/final.json` is a snapshot
//! rewritten on every finalize; the event log only ever grows. The snapshot
//! also anchors the chain: its `headDigest` must be the digest of event
//! `eventCount - 1`, so a log rebuilt from scratch is still caught.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::layout::RunLayout;
use crate::{Error, Result};

pub const EVENTS_FILE: &str = "events.ndjson";
pub const FINAL_FILE: &str = "final.json";

/// prevDigest of the first event in a log
pub const GENESIS_DIGEST: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

pub const EVENT_FINALIZE: &str = "finalize";
pub const EVENT_GOVERNANCE: &str = "governance";

/// One line of the event log. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    #[serde(default)]
    pub sequence: u64,
    pub timestamp: String,
    pub run_name: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub prev_digest: String,
    #[serde(default)]
    pub digest: String,
}

/// Everything in an event except its own digest
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventContent<'a> {
    sequence: u64,
    timestamp: &'a str,
    run_name: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    payload: &'a serde_json::Value,
    prev_digest: &'a str,
}

impl AuditEvent {
    /// Digest this event should carry given its content
    pub fn compute_digest(&self) -> Result<String> {
        let content = EventContent {
            sequence: self.sequence,
            timestamp: &self.timestamp,
            run_name: &self.run_name,
            event_type: &self.event_type,
            payload: &self.payload,
            prev_digest: &self.prev_digest,
        };
        let serialized = serde_json::to_vec(&content)?;

        let mut hasher = Sha256::new();
        hasher.update(self.prev_digest.as_bytes());
        hasher.update(&serialized);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Snapshot written by the most recent finalize
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFinal {
    pub run_name: String,
    pub finalized_at: String,
    pub events_path: PathBuf,
    pub event_count: u64,
    pub head_digest: String,
}

/// Result of re-walking the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub event_count: u64,
    pub head_digest: String,
    pub valid: bool,
    /// Zero-based line index of the first event that fails verification
    pub first_invalid: Option<u64>,
    pub reason: Option<String>,
}

pub struct AuditTrail;

impl AuditTrail {
    pub fn events_path(layout: &RunLayout) -> PathBuf {
        layout.audit_dir.join(EVENTS_FILE)
    }

    pub fn final_path(layout: &RunLayout) -> PathBuf {
        layout.audit_dir.join(FINAL_FILE)
    }

    /// Append one event, chained onto the current head
    pub fn record(
        layout: &RunLayout,
        run_name: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<AuditEvent> {
        std::fs::create_dir_all(&layout.audit_dir)?;
        let path = Self::events_path(layout);
        let events = Self::load(layout)?;

        let prev_digest = match events.last() {
            Some(last) if !last.digest.is_empty() => last.digest.clone(),
            Some(_) => {
                warn!("Previous audit event has no digest; chaining from genesis");
                GENESIS_DIGEST.to_string()
            }
            None => GENESIS_DIGEST.to_string(),
        };

        let mut event = AuditEvent {
            sequence: events.len() as u64,
            timestamp: now(),
            run_name: run_name.to_string(),
            event_type: event_type.to_string(),
            payload,
            prev_digest,
            digest: String::new(),
        };
        event.digest = event.compute_digest()?;

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;

        debug!(
            "Audit event #{} ({}) appended to {}",
            event.sequence,
            event.event_type,
            path.display()
        );
        Ok(event)
    }

    /// Append a `finalize` event and rewrite `final.json`
    pub fn finalize(layout: &RunLayout, run_name: &str) -> Result<AuditFinal> {
        let event = Self::record(layout, run_name, EVENT_FINALIZE, serde_json::json!({}))?;

        let summary = AuditFinal {
            run_name: run_name.to_string(),
            finalized_at: event.timestamp.clone(),
            events_path: Self::events_path(layout),
            event_count: event.sequence + 1,
            head_digest: event.digest.clone(),
        };
        write_atomic(
            &Self::final_path(layout),
            serde_json::to_string_pretty(&summary)?.as_bytes(),
        )?;

        info!(
            "Audit finalized for {} ({} events, head {})",
            run_name,
            summary.event_count,
            &summary.head_digest[..12]
        );
        Ok(summary)
    }

    /// All events in append order. Missing log reads as empty.
    pub fn load(layout: &RunLayout) -> Result<Vec<AuditEvent>> {
        let path = Self::events_path(layout);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| Error::InvalidArtifactFormat {
                    name: EVENTS_FILE.to_string(),
                    path: path.clone(),
                    reason: format!("line {}: {}", i + 1, e),
                })
            })
            .collect()
    }

    pub fn load_final(layout: &RunLayout) -> Result<Option<AuditFinal>> {
        match std::fs::read_to_string(Self::final_path(layout)) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Re-walk the chain and report the first broken link
    pub fn verify(layout: &RunLayout) -> Result<ChainVerification> {
        let events = Self::load(layout)?;
        let mut expected_prev = GENESIS_DIGEST.to_string();

        for (i, event) in events.iter().enumerate() {
            let broken = if event.sequence != i as u64 {
                Some(format!("sequence {} at position {}", event.sequence, i))
            } else if event.prev_digest != expected_prev {
                Some("prevDigest does not match preceding event".to_string())
            } else if event.compute_digest()? != event.digest {
                Some("digest does not match event content".to_string())
            } else {
                None
            };

            if let Some(reason) = broken {
                warn!("Audit chain broken at event {}: {}", i, reason);
                return Ok(ChainVerification {
                    event_count: events.len() as u64,
                    head_digest: expected_prev,
                    valid: false,
                    first_invalid: Some(i as u64),
                    reason: Some(reason),
                });
            }
            expected_prev = event.digest.clone();
        }

        let mut verification = ChainVerification {
            event_count: events.len() as u64,
            head_digest: expected_prev,
            valid: true,
            first_invalid: None,
            reason: None,
        };

        if let Some(summary) = Self::load_final(layout)? {
            if let Some((index, reason)) = anchor_mismatch(&events, &summary) {
                warn!("Audit snapshot disagrees with log at event {}: {}", index, reason);
                verification.valid = false;
                verification.first_invalid = Some(index);
                verification.reason = Some(reason);
            }
        }
        Ok(verification)
    }
}

/// Where `final.json` and an otherwise intact log disagree
fn anchor_mismatch(events: &[AuditEvent], summary: &AuditFinal) -> Option<(u64, String)> {
    let held = events.len() as u64;
    if summary.event_count > held {
        return Some((
            held,
            format!(
                "final.json records {} events but the log holds {}",
                summary.event_count, held
            ),
        ));
    }

    let anchor = match summary.event_count.checked_sub(1) {
        Some(index) => events[index as usize].digest.as_str(),
        None => GENESIS_DIGEST,
    };
    if anchor != summary.head_digest {
        let index = summary.event_count.saturating_sub(1);
        return Some((
            index,
            format!("final.json headDigest does not match event {}", index),
        ));
    }
    None
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Write via a temp file in the same directory, then rename into place
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout(tmp: &TempDir) -> RunLayout {
        RunLayout::resolve(tmp.path(), "audit-run").unwrap()
    }

    fn line_count(path: &Path) -> usize {
        std::fs::read_to_string(path).unwrap().lines().count()
    }

    #[test]
    fn test_finalize_appends_one_line_per_call() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);

        let mut last = None;
        for n in 1..=3 {
            last = Some(AuditTrail::finalize(&layout, "audit-run").unwrap());
            assert_eq!(line_count(&AuditTrail::events_path(&layout)), n);
        }

        let final_on_disk = AuditTrail::load_final(&layout).unwrap().unwrap();
        assert_eq!(Some(final_on_disk.clone()), last);
        assert_eq!(final_on_disk.event_count, 3);

        let events = AuditTrail::load(&layout).unwrap();
        assert_eq!(final_on_disk.finalized_at, events[2].timestamp);
        assert_eq!(final_on_disk.head_digest, events[2].digest);
        assert!(events.iter().all(|e| e.event_type == EVENT_FINALIZE));

        let audit_files: Vec<_> = std::fs::read_dir(&layout.audit_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(audit_files.len(), 2);
    }

    #[test]
    fn test_chain_links_events() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        let first = AuditTrail::record(&layout, "audit-run", "governance", serde_json::json!({"passed": true})).unwrap();
        let second = AuditTrail::finalize(&layout, "audit-run").unwrap();

        assert_eq!(first.prev_digest, GENESIS_DIGEST);
        let events = AuditTrail::load(&layout).unwrap();
        assert_eq!(events[1].prev_digest, first.digest);
        assert_eq!(second.head_digest, events[1].digest);

        let report = AuditTrail::verify(&layout).unwrap();
        assert!(report.valid);
        assert_eq!(report.event_count, 2);
        assert_eq!(report.head_digest, second.head_digest);
    }

    #[test]
    fn test_tampering_is_detected() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        AuditTrail::record(&layout, "audit-run", "governance", serde_json::json!({"passed": false})).unwrap();
        AuditTrail::finalize(&layout, "audit-run").unwrap();

        let path = AuditTrail::events_path(&layout);
        let tampered = std::fs::read_to_string(&path)
            .unwrap()
            .replace(r#""passed":false"#, r#""passed":true"#);
        std::fs::write(&path, tampered).unwrap();

        let report = AuditTrail::verify(&layout).unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_invalid, Some(0));
    }

    #[test]
    fn test_deleted_line_is_detected() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        for _ in 0..3 {
            AuditTrail::finalize(&layout, "audit-run").unwrap();
        }

        let path = AuditTrail::events_path(&layout);
        let kept: Vec<_> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .enumerate()
            .filter(|(i, _)| *i != 1)
            .map(|(_, l)| format!("{l}\n"))
            .collect();
        std::fs::write(&path, kept.concat()).unwrap();

        let report = AuditTrail::verify(&layout).unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_invalid, Some(1));
    }

    #[test]
    fn test_rebuilt_log_fails_final_anchor() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        AuditTrail::finalize(&layout, "audit-run").unwrap();
        AuditTrail::finalize(&layout, "audit-run").unwrap();

        // A self-consistent chain of the same length, written elsewhere
        let other = TempDir::new().unwrap();
        let forged = RunLayout::resolve(other.path(), "audit-run").unwrap();
        AuditTrail::finalize(&forged, "audit-run").unwrap();
        AuditTrail::finalize(&forged, "audit-run").unwrap();
        std::fs::copy(AuditTrail::events_path(&forged), AuditTrail::events_path(&layout)).unwrap();

        let report = AuditTrail::verify(&layout).unwrap();
        assert!(!report.valid);
        assert_eq!(report.event_count, 2);
        assert_eq!(report.first_invalid, Some(1));
        assert!(report.reason.unwrap().contains("headDigest"));
    }

    #[test]
    fn test_truncated_log_fails_final_anchor() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        AuditTrail::finalize(&layout, "audit-run").unwrap();
        AuditTrail::finalize(&layout, "audit-run").unwrap();

        let path = AuditTrail::events_path(&layout);
        let first = std::fs::read_to_string(&path).unwrap().lines().next().unwrap().to_string();
        std::fs::write(&path, format!("{first}\n")).unwrap();

        let report = AuditTrail::verify(&layout).unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_invalid, Some(1));
    }

    #[test]
    fn test_empty_log_verifies() {
        let tmp = TempDir::new().unwrap();
        let report = AuditTrail::verify(&layout(&tmp)).unwrap();
        assert!(report.valid);
        assert_eq!(report.event_count, 0);
        assert_eq!(report.head_digest, GENESIS_DIGEST);
    }

    #[test]
    fn test_unwritable_audit_dir_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        std::fs::remove_dir_all(&layout.audit_dir).unwrap();
        std::fs::write(&layout.audit_dir, "blocking file").unwrap();

        let err = AuditTrail::finalize(&layout, "audit-run").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
