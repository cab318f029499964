use crate::AuditError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use smol_str::SmolStr;

type HmacSha256 = Hmac<Sha256>;

/// One audit line. `hash` is the HMAC of the canonical record without
/// `hash`; `prev_hash` chains to the previous record's `hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: SmolStr,
    pub ts: DateTime<Utc>,
    /// Event kind, eg/ "orderFilled", "riskEvent".
    pub kind: SmolStr,
    /// Severity label, eg/ "info", "critical".
    pub level: SmolStr,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl AuditRecord {
    pub fn new(
        id: impl AsRef<str>,
        ts: DateTime<Utc>,
        kind: impl AsRef<str>,
        level: impl AsRef<str>,
        data: Value,
    ) -> Self {
        Self {
            id: SmolStr::new(id),
            ts,
            kind: SmolStr::new(kind),
            level: SmolStr::new(level),
            data,
            meta: Value::Null,
            prev_hash: None,
            hash: None,
        }
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }
}

/// Canonical JSON: keys sorted recursively, compact encoding. The chain
/// hash is computed over this form so key order never breaks verification.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, AuditError> {
    let raw = serde_json::to_value(value)?;
    let sorted = sort_keys(&raw);
    Ok(serde_json::to_string(&sorted)?)
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        _ => value.clone(),
    }
}

/// HMAC-SHA256 of the record without its own `hash` field, keyed by the
/// integrity key, hex encoded.
pub fn chain_hash(record: &AuditRecord, integrity_key: &[u8]) -> Result<String, AuditError> {
    let mut unhashed = record.clone();
    unhashed.hash = None;
    let canonical = canonical_json(&unhashed)?;

    let mut mac = HmacSha256::new_from_slice(integrity_key)
        .expect("hmac accepts keys of any length");
    mac.update(canonical.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> AuditRecord {
        AuditRecord::new(
            "r-1",
            DateTime::from_timestamp(0, 0).unwrap(),
            "orderFilled",
            "info",
            json!({"b": 2, "a": 1}),
        )
    }

    #[test]
    fn canonical_form_sorts_keys() {
        let canonical = canonical_json(&json!({"b": 2, "a": {"d": 4, "c": 3}})).unwrap();
        assert_eq!(canonical, r#"{"a":{"c":3,"d":4},"b":2}"#);
    }

    #[test]
    fn hash_is_stable_and_keyed() {
        let record = record();
        let h1 = chain_hash(&record, b"key-a").unwrap();
        let h2 = chain_hash(&record, b"key-a").unwrap();
        let h3 = chain_hash(&record, b"key-b").unwrap();
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn hash_ignores_own_hash_field() {
        let mut record = record();
        let before = chain_hash(&record, b"key").unwrap();
        record.hash = Some("bogus".into());
        assert_eq!(chain_hash(&record, b"key").unwrap(), before);
    }
}
