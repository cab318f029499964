use serde_json::Value;
use std::collections::BTreeSet;

const REDACTED: &str = "[REDACTED]";

/// Field names whose values are always masked, matched case-insensitively
/// as substrings of the key.
pub fn default_sensitive_fields() -> BTreeSet<String> {
    [
        "password",
        "secret",
        "api_key",
        "apikey",
        "passphrase",
        "token",
        "authorization",
        "private_key",
        "credential",
        "signature",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Recursive sensitive-field masking with a depth cap. Values under a
/// matching key are replaced wholesale; traversal stops at `max_depth` so
/// adversarial nesting cannot stall the writer.
#[derive(Debug, Clone)]
pub struct Redactor {
    fields: BTreeSet<String>,
    max_depth: usize,
}

impl Redactor {
    pub fn new(fields: BTreeSet<String>, max_depth: usize) -> Self {
        Self {
            fields: fields.into_iter().map(|f| f.to_lowercase()).collect(),
            max_depth: max_depth.max(1),
        }
    }

    fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.fields.iter().any(|field| key.contains(field))
    }

    pub fn redact(&self, value: &Value) -> Value {
        self.redact_at(value, 0)
    }

    fn redact_at(&self, value: &Value, depth: usize) -> Value {
        if depth >= self.max_depth {
            return Value::String(REDACTED.into());
        }
        match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, nested) in map {
                    if self.is_sensitive(key) {
                        out.insert(key.clone(), Value::String(REDACTED.into()));
                    } else {
                        out.insert(key.clone(), self.redact_at(nested, depth + 1));
                    }
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.redact_at(item, depth + 1))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(default_sensitive_fields(), 16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_sensitive_keys_recursively() {
        let redactor = Redactor::default();
        let input = json!({
            "symbol": "BTC/USDT",
            "api_key": "abc123",
            "nested": {"exchange_secret": "xyz", "qty": 1},
            "list": [{"token": "t"}],
        });
        let output = redactor.redact(&input);
        assert_eq!(output["symbol"], "BTC/USDT");
        assert_eq!(output["api_key"], "[REDACTED]");
        assert_eq!(output["nested"]["exchange_secret"], "[REDACTED]");
        assert_eq!(output["nested"]["qty"], 1);
        assert_eq!(output["list"][0]["token"], "[REDACTED]");
    }

    #[test]
    fn depth_cap_stops_traversal() {
        let redactor = Redactor::new(default_sensitive_fields(), 2);
        let input = json!({"a": {"b": {"c": {"d": 1}}}});
        let output = redactor.redact(&input);
        assert_eq!(output["a"]["b"], "[REDACTED]");
    }

    #[test]
    fn key_match_is_case_insensitive() {
        let redactor = Redactor::default();
        let output = redactor.redact(&json!({"API_KEY": "x", "Password": "y"}));
        assert_eq!(output["API_KEY"], "[REDACTED]");
        assert_eq!(output["Password"], "[REDACTED]");
    }
}
