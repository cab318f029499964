use crate::{
    AuditError,
    record::{AuditRecord, chain_hash},
};
use std::fs;
use std::path::Path;

/// Outcome of walking a segment's chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub valid: bool,
    /// Records examined before stopping.
    pub lines: usize,
    /// Line number (1-indexed) and reason of the first broken link.
    pub first_broken: Option<(usize, String)>,
    /// True when the break was a chain linkage or hash mismatch, as
    /// opposed to an unparsable line.
    pub chain_broken: bool,
}

impl VerifyReport {
    fn valid(lines: usize) -> Self {
        Self {
            valid: true,
            lines,
            first_broken: None,
            chain_broken: false,
        }
    }

    fn broken(line: usize, reason: String, chain_broken: bool, lines: usize) -> Self {
        Self {
            valid: false,
            lines,
            first_broken: Some((line, reason)),
            chain_broken,
        }
    }
}

/// Verify one on-disk segment.
pub fn verify_segment(
    path: impl AsRef<Path>,
    integrity_key: &[u8],
) -> Result<VerifyReport, AuditError> {
    let content = fs::read_to_string(path.as_ref()).map_err(|source| AuditError::Io {
        path: path.as_ref().to_path_buf(),
        source,
    })?;
    verify_str(&content, integrity_key)
}

/// Walk JSONL content, recomputing every record's HMAC and checking each
/// `prev_hash` link. Stops at the first broken link.
pub fn verify_str(content: &str, integrity_key: &[u8]) -> Result<VerifyReport, AuditError> {
    let mut prev_hash: Option<String> = None;
    let mut lines = 0usize;

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        lines += 1;

        let record: AuditRecord = match serde_json::from_str(trimmed) {
            Ok(record) => record,
            Err(error) => {
                return Ok(VerifyReport::broken(
                    line_no,
                    format!("unparsable record: {error}"),
                    false,
                    lines,
                ));
            }
        };

        if record.prev_hash != prev_hash {
            return Ok(VerifyReport::broken(
                line_no,
                format!(
                    "prev_hash mismatch: expected {prev_hash:?}, found {:?}",
                    record.prev_hash
                ),
                true,
                lines,
            ));
        }

        let Some(claimed) = record.hash.clone() else {
            return Ok(VerifyReport::broken(
                line_no,
                "record missing hash".into(),
                true,
                lines,
            ));
        };
        let recomputed = chain_hash(&record, integrity_key)?;
        if claimed != recomputed {
            return Ok(VerifyReport::broken(
                line_no,
                "hash mismatch: record tampered or wrong key".into(),
                true,
                lines,
            ));
        }
        prev_hash = Some(claimed);
    }

    Ok(VerifyReport::valid(lines))
}
