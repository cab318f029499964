use crate::{
    AuditError,
    record::{AuditRecord, canonical_json, chain_hash},
    redact::Redactor,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Audit sink configuration.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Directory segments are written into.
    pub directory: PathBuf,
    /// Segment file prefix, eg/ "kestrel" -> `kestrel-2026-08-01.log`.
    pub prefix: String,
    /// Size cap per segment before a `.seq` sibling is opened.
    pub max_segment_bytes: u64,
    /// Segments older than this are deleted by the retention sweep.
    pub retention: Duration,
}

impl AuditConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            prefix: "kestrel".into(),
            max_segment_bytes: 64 * 1024 * 1024,
            retention: Duration::days(30),
        }
    }
}

/// Append-only segmented writer maintaining the HMAC chain. A single
/// writer owns the sink, which serialises the hash sequence by
/// construction.
#[derive(Debug)]
pub struct AuditWriter {
    config: AuditConfig,
    redactor: Redactor,
    integrity_key: Vec<u8>,
    last_hash: Option<String>,
    current_date: Option<NaiveDate>,
    current_seq: u32,
    current_bytes: u64,
}

impl AuditWriter {
    pub fn new(
        config: AuditConfig,
        redactor: Redactor,
        integrity_key: impl Into<Vec<u8>>,
    ) -> Result<Self, AuditError> {
        fs::create_dir_all(&config.directory).map_err(|source| AuditError::Io {
            path: config.directory.clone(),
            source,
        })?;
        Ok(Self {
            config,
            redactor,
            integrity_key: integrity_key.into(),
            last_hash: None,
            current_date: None,
            current_seq: 0,
            current_bytes: 0,
        })
    }

    /// Restore chain state after a restart (read from the last line of the
    /// latest segment).
    pub fn set_last_hash(&mut self, last_hash: Option<String>) {
        self.last_hash = last_hash;
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    fn segment_name(&self, date: NaiveDate, seq: u32) -> String {
        if seq == 0 {
            format!("{}-{}.log", self.config.prefix, date.format("%Y-%m-%d"))
        } else {
            format!(
                "{}-{}.{}.log",
                self.config.prefix,
                date.format("%Y-%m-%d"),
                seq
            )
        }
    }

    fn segment_path(&self, date: NaiveDate, seq: u32) -> PathBuf {
        self.config.directory.join(self.segment_name(date, seq))
    }

    /// Current segment path for `ts`, rolling on day change and size cap.
    /// Every segment carries an independent chain, so any single file
    /// verifies on its own; rolling resets the chain head.
    fn roll_segment(&mut self, ts: DateTime<Utc>) -> PathBuf {
        let date = ts.date_naive();
        if self.current_date != Some(date) {
            self.current_date = Some(date);
            self.current_seq = 0;
            self.current_bytes = existing_len(&self.segment_path(date, 0));
            if self.current_bytes == 0 {
                self.last_hash = None;
            }
        }
        if self.current_bytes >= self.config.max_segment_bytes {
            self.current_seq += 1;
            self.current_bytes = 0;
            self.last_hash = None;
            debug!(seq = self.current_seq, "audit segment rotated on size");
        }
        self.segment_path(date, self.current_seq)
    }

    /// Redact, chain-hash and append one record. Returns the record as
    /// written (with `prev_hash`/`hash` populated).
    pub fn append(&mut self, mut record: AuditRecord) -> Result<AuditRecord, AuditError> {
        let path = self.roll_segment(record.ts);

        record.data = self.redactor.redact(&record.data);
        record.meta = self.redactor.redact(&record.meta);
        record.prev_hash = self.last_hash.clone();
        let hash = chain_hash(&record, &self.integrity_key)?;
        record.hash = Some(hash.clone());

        let line = canonical_json(&record)?;
        append_line(&path, &line)?;
        self.current_bytes += line.len() as u64 + 1;
        self.last_hash = Some(hash);
        Ok(record)
    }

    /// Delete segments older than the retention window. Returns the number
    /// of segments removed.
    pub fn sweep_retention(&self, now: DateTime<Utc>) -> Result<usize, AuditError> {
        let horizon = now.date_naive() - self.config.retention;
        let entries = fs::read_dir(&self.config.directory).map_err(|source| AuditError::Io {
            path: self.config.directory.clone(),
            source,
        })?;

        let mut removed = 0usize;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(date) = self.segment_date(name) else {
                continue;
            };
            if date < horizon {
                if fs::remove_file(entry.path()).is_ok() {
                    info!(segment = name, "audit segment expired");
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Parse the date out of `<prefix>-YYYY-MM-DD[.seq].log`.
    fn segment_date(&self, name: &str) -> Option<NaiveDate> {
        let rest = name
            .strip_prefix(&self.config.prefix)?
            .strip_prefix('-')?
            .strip_suffix(".log")?;
        let date_part = rest.split('.').next()?;
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
    }

    /// All segment paths, oldest first.
    pub fn segments(&self) -> Result<Vec<PathBuf>, AuditError> {
        let entries = fs::read_dir(&self.config.directory).map_err(|source| AuditError::Io {
            path: self.config.directory.clone(),
            source,
        })?;
        let mut segments: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .and_then(|name| self.segment_date(name))
                    .is_some()
            })
            .collect();
        segments.sort();
        Ok(segments)
    }
}

fn existing_len(path: &Path) -> u64 {
    fs::metadata(path).map(|meta| meta.len()).unwrap_or(0)
}

fn append_line(path: &Path, line: &str) -> Result<(), AuditError> {
    let io_error = |source| AuditError::Io {
        path: path.to_path_buf(),
        source,
    };
    let created = !path.exists();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error)?;
    if created {
        restrict_permissions(path).map_err(io_error)?;
    }
    file.write_all(line.as_bytes()).map_err(io_error)?;
    file.write_all(b"\n").map_err(io_error)?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
