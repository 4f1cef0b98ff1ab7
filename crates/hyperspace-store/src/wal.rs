use hyperspace_core::error::{EngineError, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// The single version tag this build writes. Replay treats any other value
/// as a corrupt record rather than silently accepting it — there is
/// currently exactly one version in circulation, so this only exists to make
/// a future format change detectable.
pub const WAL_VERSION: &str = "1";

/// Append-only, UTF-8, line-oriented write-ahead log.
///
/// Each line is `log_id|version|op|json_payload`, produced with
/// [`str::splitn`] bounded to 4 parts on replay so that a literal `|`
/// anywhere inside the JSON payload (always the last field) never fragments
/// the parse. `log_id`, `version`, and `op` are written by this module alone
/// and are guaranteed never to contain `|`.
pub struct Wal {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    next_id: AtomicU64,
    last_snapshot_id: AtomicU64,
}

impl Wal {
    /// Opens (creating if absent) the log file for append, seeded with the
    /// snapshot high-water mark the coordinator already loaded from the
    /// scalar store. `next_id` starts one past it; [`Wal::replay`] advances
    /// it further if the file on disk holds records beyond that point.
    pub fn open(path: impl AsRef<Path>, last_snapshot_id: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Wal {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            next_id: AtomicU64::new(last_snapshot_id + 1),
            last_snapshot_id: AtomicU64::new(last_snapshot_id),
        })
    }

    pub fn next_id_peek(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    pub fn last_snapshot_id(&self) -> u64 {
        self.last_snapshot_id.load(Ordering::SeqCst)
    }

    /// Freezes `last_snapshot_id := next_id` at entry, per the snapshot
    /// watermark invariant — this must run before the snapshot body is
    /// written, not after, so that any record appended concurrently with a
    /// (would-be-overlapping) snapshot is never silently dropped from a
    /// future replay.
    pub fn freeze_snapshot_watermark(&self) -> u64 {
        let watermark = self.next_id.load(Ordering::SeqCst);
        self.last_snapshot_id.store(watermark, Ordering::SeqCst);
        watermark
    }

    /// Allocates `log_id = next_id`, appends the formatted line, flushes to
    /// the OS, and `fsync`s before returning. The caller may treat the
    /// return as durable.
    pub fn append(&self, op: &str, payload: &serde_json::Value) -> Result<u64> {
        let log_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let payload_json = serde_json::to_string(payload)?;
        if payload_json.contains('\n') {
            return Err(EngineError::BadRequest(
                "payload must not contain a literal newline".to_string(),
            ));
        }
        let line = format!("{log_id}|{WAL_VERSION}|{op}|{payload_json}\n");

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| EngineError::Internal("WAL writer mutex poisoned".to_string()))?;
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(log_id)
    }

    /// Replays every record with `log_id > last_snapshot_id` in file order,
    /// invoking `f(op, payload)` for each. Records at or below the watermark
    /// are skipped (already folded into the snapshot) but still contribute
    /// to advancing `next_id`. A malformed line aborts replay with
    /// `CorruptLog`; a version mismatch is treated the same way.
    pub fn replay<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&str, serde_json::Value) -> Result<()>,
    {
        if !self.path.exists() {
            return Ok(());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let watermark = self.last_snapshot_id.load(Ordering::SeqCst);
        let mut max_seen = watermark;

        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let (log_id, version, op, payload) = parse_line(&line)?;
            if version != WAL_VERSION {
                return Err(EngineError::CorruptLog {
                    log_id,
                    reason: format!("unsupported WAL version {version:?}"),
                });
            }
            max_seen = max_seen.max(log_id);
            if log_id <= watermark {
                continue;
            }
            f(op, payload)?;
        }

        self.next_id.fetch_max(max_seen + 1, Ordering::SeqCst);
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| EngineError::Internal("WAL writer mutex poisoned".to_string()))?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }
}

fn parse_line(line: &str) -> Result<(u64, &str, &str, serde_json::Value)> {
    let mut parts = line.splitn(4, '|');
    let log_id = parts
        .next()
        .ok_or_else(|| corrupt(0, "missing log_id field"))?;
    let log_id: u64 = log_id
        .parse()
        .map_err(|_| corrupt(0, &format!("non-numeric log_id {log_id:?}")))?;
    let version = parts
        .next()
        .ok_or_else(|| corrupt(log_id, "missing version field"))?;
    let op = parts
        .next()
        .ok_or_else(|| corrupt(log_id, "missing op field"))?;
    let payload_str = parts
        .next()
        .ok_or_else(|| corrupt(log_id, "missing payload field"))?;
    let payload: serde_json::Value = serde_json::from_str(payload_str)
        .map_err(|e| corrupt(log_id, &format!("invalid json payload: {e}")))?;
    Ok((log_id, version, op, payload))
}

fn corrupt(log_id: u64, reason: &str) -> EngineError {
    EngineError::CorruptLog {
        log_id,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn append_then_replay_round_trips_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let wal = Wal::open(&path, 0).unwrap();
        let id = wal
            .append("upsert", &json!({"id": 1, "vectors": [1.0, 0.0]}))
            .unwrap();
        assert_eq!(id, 1);

        let mut seen = Vec::new();
        wal.replay(|op, payload| {
            seen.push((op.to_string(), payload));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "upsert");
        assert_eq!(seen[0].1["id"], 1);
    }

    #[test]
    fn log_ids_are_strictly_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::open(dir.path().join("wal.log"), 0).unwrap();
        let a = wal.append("upsert", &json!({"id": 1})).unwrap();
        let b = wal.append("upsert", &json!({"id": 2})).unwrap();
        assert!(a < b);
    }

    #[test]
    fn replay_skips_records_at_or_below_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        {
            let wal = Wal::open(&path, 0).unwrap();
            wal.append("upsert", &json!({"id": 1})).unwrap();
            wal.append("upsert", &json!({"id": 2})).unwrap();
            wal.append("upsert", &json!({"id": 3})).unwrap();
        }
        // Reopen as if a snapshot had been taken after log_id 2.
        let wal = Wal::open(&path, 2).unwrap();
        let mut seen = Vec::new();
        wal.replay(|_, payload| {
            seen.push(payload["id"].as_u64().unwrap());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![3]);
        assert_eq!(wal.next_id_peek(), 4);
    }

    #[test]
    fn pipe_character_inside_payload_does_not_corrupt_parse() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::open(dir.path().join("wal.log"), 0).unwrap();
        wal.append("upsert", &json!({"id": 1, "name": "a|b|c"}))
            .unwrap();
        let mut seen = Vec::new();
        wal.replay(|_, payload| {
            seen.push(payload["name"].as_str().unwrap().to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["a|b|c".to_string()]);
    }

    #[test]
    fn malformed_line_aborts_replay_with_corrupt_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        {
            let wal = Wal::open(&path, 0).unwrap();
            wal.append("upsert", &json!({"id": 1})).unwrap();
        }
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"not-a-valid-line\n")
            .unwrap();

        let wal = Wal::open(&path, 0).unwrap();
        let result = wal.replay(|_, _| Ok(()));
        assert!(matches!(result, Err(EngineError::CorruptLog { .. })));
    }

    #[test]
    fn version_mismatch_is_corrupt_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        std::fs::write(&path, b"1|99|upsert|{}\n").unwrap();
        let wal = Wal::open(&path, 0).unwrap();
        let result = wal.replay(|_, _| Ok(()));
        assert!(matches!(result, Err(EngineError::CorruptLog { .. })));
    }

    #[test]
    fn snapshot_watermark_freezes_at_next_id_at_entry() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::open(dir.path().join("wal.log"), 0).unwrap();
        wal.append("upsert", &json!({"id": 1})).unwrap();
        wal.append("upsert", &json!({"id": 2})).unwrap();
        let watermark = wal.freeze_snapshot_watermark();
        assert_eq!(watermark, wal.next_id_peek());
        assert_eq!(wal.last_snapshot_id(), watermark);
    }
}
