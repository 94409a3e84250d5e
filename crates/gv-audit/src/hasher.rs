// hasher.rs — SHA-256 hashing utilities.
//
// All hashes in the governance audit log are SHA-256, lowercase hex.
// Structured values are hashed over their canonical JSON: serde_json's
// default map type keeps object keys sorted, so the same value always
// produces the same bytes regardless of struct field order.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::AuditError;

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a UTF-8 string.
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Canonical JSON text: compact, object keys sorted.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, AuditError> {
    // Going through `Value` re-sorts keys into a BTreeMap.
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&value)?)
}

/// Hash any serializable value over its canonical JSON.
pub fn hash_json<T: Serialize + ?Sized>(value: &T) -> Result<String, AuditError> {
    Ok(hash_str(&canonical_json(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_known_value() {
        // SHA-256("")
        assert_eq!(
            hash_str(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hash_is_hex_encoded_sha256() {
        let hash = hash_str("test");
        assert_eq!(hash.len(), 64);
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn canonical_json_ignores_key_order() {
        let a: serde_json::Value = serde_json::from_str(r#"{"b":1,"a":{"d":2,"c":3}}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a":{"c":3,"d":2},"b":1}"#).unwrap();
        assert_eq!(canonical_json(&a).unwrap(), r#"{"a":{"c":3,"d":2},"b":1}"#);
        assert_eq!(hash_json(&a).unwrap(), hash_json(&b).unwrap());
    }
}
