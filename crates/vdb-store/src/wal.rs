use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use vdb_core::Durability;

use crate::error::StoreError;

const SNAPSHOT_WATERMARK_FILE: &str = "snapshots_MaxLogID";

/// Append-only text log: one record per line, `log_id|version|op|json`.
/// `log_id` is strictly monotonic and survives restart — `open` scans
/// the existing file once to seed the counter above the highest id seen.
pub struct Wal {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
    mode: Durability,
    id_counter: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct WalRecord {
    pub log_id: u64,
    pub version: u32,
    pub op: String,
    pub payload: String,
}

impl Wal {
    pub fn open(path: &Path, mode: Durability) -> Result<Self, StoreError> {
        let mut max_id = 0u64;
        if path.exists() {
            let file = File::open(path)?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                if let Some(record) = parse_line(&line) {
                    max_id = max_id.max(record.log_id);
                }
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
            mode,
            id_counter: AtomicU64::new(max_id),
        })
    }

    fn next_id(&self) -> u64 {
        self.id_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_id(&self) -> u64 {
        self.id_counter.load(Ordering::SeqCst)
    }

    /// Appends a new record with a freshly minted `log_id`.
    pub fn append(&self, op: &str, payload_json: &str, version: u32) -> Result<u64, StoreError> {
        let log_id = self.next_id();
        self.write_line(log_id, version, op, payload_json)?;
        Ok(log_id)
    }

    /// Appends a record at a caller-supplied `log_id`, used by the
    /// replication layer so the local WAL's ids track its own commit
    /// index. Advances the local counter if the supplied id is ahead of
    /// it, so a subsequent local `append` never collides.
    pub fn append_raw(&self, log_id: u64, op: &str, payload_json: &str, version: u32) -> Result<(), StoreError> {
        self.id_counter.fetch_max(log_id, Ordering::SeqCst);
        self.write_line(log_id, version, op, payload_json)
    }

    fn write_line(&self, log_id: u64, version: u32, op: &str, payload_json: &str) -> Result<(), StoreError> {
        let line = format!("{log_id}|{version}|{op}|{payload_json}\n");
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        if matches!(self.mode, Durability::Strict) {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    pub fn fsync(&self) -> Result<(), StoreError> {
        let writer = self.writer.lock();
        writer.get_ref().sync_all()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reader over WAL lines with `log_id > last_snapshot_id`; entries at
    /// or below the watermark are already materialized in the snapshot
    /// and are skipped rather than replayed.
    pub fn replay(&self, last_snapshot_id: u64) -> Result<WalReplay, StoreError> {
        let file = File::open(&self.path)?;
        Ok(WalReplay { lines: BufReader::new(file).lines(), last_snapshot_id })
    }
}

pub struct WalReplay {
    lines: std::io::Lines<BufReader<File>>,
    last_snapshot_id: u64,
}

impl Iterator for WalReplay {
    type Item = Result<WalRecord, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(l) => l,
                Err(e) => return Some(Err(StoreError::from(e))),
            };
            let Some(record) = parse_line(&line) else {
                // A line that doesn't match the grammar marks end of log.
                return None;
            };
            if record.log_id <= self.last_snapshot_id {
                continue;
            }
            return Some(Ok(record));
        }
    }
}

fn parse_line(line: &str) -> Option<WalRecord> {
    let mut parts = line.splitn(4, '|');
    let log_id = parts.next()?.parse().ok()?;
    let version = parts.next()?.parse().ok()?;
    let op = parts.next()?.to_string();
    let payload = parts.next()?.to_string();
    Some(WalRecord { log_id, version, op, payload })
}

pub fn read_snapshot_watermark(snapshot_dir: &Path) -> Result<u64, StoreError> {
    let path = snapshot_dir.join(SNAPSHOT_WATERMARK_FILE);
    if !path.exists() {
        return Ok(0);
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(contents.trim().parse().unwrap_or(0))
}

pub fn write_snapshot_watermark(snapshot_dir: &Path, last_snapshot_id: u64) -> Result<(), StoreError> {
    std::fs::create_dir_all(snapshot_dir)?;
    let path = snapshot_dir.join(SNAPSHOT_WATERMARK_FILE);
    std::fs::write(path, last_snapshot_id.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_ids_are_strictly_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::open(&dir.path().join("wal.log"), Durability::Strict).unwrap();
        let a = wal.append("upsert", "{}", 1).unwrap();
        let b = wal.append("upsert", "{}", 1).unwrap();
        let c = wal.append("upsert", "{}", 1).unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn restart_continues_id_sequence_above_the_previous_max() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        {
            let wal = Wal::open(&path, Durability::Strict).unwrap();
            wal.append("upsert", "{}", 1).unwrap();
            wal.append("upsert", "{}", 1).unwrap();
        }
        let wal = Wal::open(&path, Durability::Strict).unwrap();
        let next = wal.append("upsert", "{}", 1).unwrap();
        assert!(next > 2);
    }

    #[test]
    fn replay_skips_entries_at_or_below_the_snapshot_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::open(&dir.path().join("wal.log"), Durability::Strict).unwrap();
        let first = wal.append("upsert", "{\"id\":1}", 1).unwrap();
        wal.append("upsert", "{\"id\":2}", 1).unwrap();
        let records: Vec<_> = wal.replay(first).unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload, "{\"id\":2}");
    }

    #[test]
    fn snapshot_watermark_round_trips_through_the_sidecar_file() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot_watermark(dir.path(), 42).unwrap();
        assert_eq!(read_snapshot_watermark(dir.path()).unwrap(), 42);
    }

    #[test]
    fn missing_watermark_file_means_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_snapshot_watermark(dir.path()).unwrap(), 0);
    }
}
