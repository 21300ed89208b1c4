//! Connection details carried by meta documents.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use stencil_core::{ByteString, ConnectionDetails, Object, ObjectExt};
use tracing::warn;

/// Copy `data` entries into `details`, base64-decoding each value.
///
/// A value that does not decode is stored as its raw bytes: rendered secrets
/// may already be in the secret store's native encoding. A `data` field that
/// is absent or not a mapping of strings contributes nothing. Returns the
/// number of entries written.
pub fn extract_connection_details(doc: &Object, details: &mut ConnectionDetails) -> usize {
    let data = match doc.nested_string_map(&["data"]) {
        Ok(d) => d,
        Err(e) => {
            if !e.is_not_found() {
                warn!(error = %e, "ignoring malformed connection details data");
            }
            return 0;
        }
    };
    let written = data.len();
    for (key, value) in data {
        let bytes = match STANDARD.decode(value.as_bytes()) {
            Ok(b) => b,
            Err(e) => {
                warn!(key = %key, error = %e, "connection detail is not base64; keeping raw value");
                value.into_bytes()
            }
        };
        details.insert(key, ByteString(bytes));
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn doc(v: Value) -> Object { v.as_object().cloned().unwrap() }

    #[test]
    fn decodes_base64_values() {
        let mut cd = ConnectionDetails::new();
        let n = extract_connection_details(&doc(json!({ "data": { "user": "dXNlcg==", "pass": "cGFzcw==" } })), &mut cd);
        assert_eq!(n, 2);
        assert_eq!(cd["user"].0, b"user".to_vec());
        assert_eq!(cd["pass"].0, b"pass".to_vec());
    }

    #[test]
    fn overwrites_existing_keys_and_keeps_others() {
        let mut cd = ConnectionDetails::new();
        cd.insert("user".into(), ByteString(b"old".to_vec()));
        cd.insert("host".into(), ByteString(b"db".to_vec()));
        extract_connection_details(&doc(json!({ "data": { "user": "bmV3" } })), &mut cd);
        assert_eq!(cd["user"].0, b"new".to_vec());
        assert_eq!(cd["host"].0, b"db".to_vec());
    }

    #[test]
    fn undecodable_value_is_kept_raw() {
        let mut cd = ConnectionDetails::new();
        extract_connection_details(&doc(json!({ "data": { "token": "not base64!" } })), &mut cd);
        assert_eq!(cd["token"].0, b"not base64!".to_vec());
    }

    #[test]
    fn missing_or_malformed_data_is_ignored() {
        let mut cd = ConnectionDetails::new();
        assert_eq!(extract_connection_details(&doc(json!({ "kind": "CompositeConnectionDetails" })), &mut cd), 0);
        assert_eq!(extract_connection_details(&doc(json!({ "data": { "port": 5432, "user": "dXNlcg==" } })), &mut cd), 0);
        assert!(cd.is_empty());
    }
}
