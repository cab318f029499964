#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]

//! Kestrel audit sink.
//!
//! Every engine event lands here as an append-only JSON line carrying an
//! HMAC-SHA256 integrity chain: each record's `hash` covers the record
//! (minus `hash`) keyed by the integrity key, and `prev_hash` links to the
//! previous record. Sensitive fields are redacted before hashing, segments
//! rotate per UTC day and size cap, and old segments age out on a
//! retention sweep. [`verify`] walks a segment and reports the first
//! broken link.

use std::path::PathBuf;
use thiserror::Error;

/// Record model and integrity chain hashing.
pub mod record;

/// Recursive sensitive-field redaction.
pub mod redact;

/// Chain verification.
pub mod verify;

/// Segmented append-only writer.
pub mod writer;

pub use record::{AuditRecord, chain_hash};
pub use redact::{Redactor, default_sensitive_fields};
pub use verify::{VerifyReport, verify_segment, verify_str};
pub use writer::{AuditConfig, AuditWriter};

/// Defines all possible errors in the audit sink.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit io failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("audit record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("audit chain broken at line {line}: {reason}")]
    ChainBroken { line: usize, reason: String },
}
