//! Payload decoding for table loads

use crate::engine::InsertData;
use crate::errors::{DucklingError, Result};
use crate::model::{PayloadCompression, PayloadType};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::ZlibDecoder;
use std::io::Read;

/// Turn a load payload into engine insert data
///
/// JSON payloads pass through untouched (compression does not apply to
/// them). Binary payloads must be base64 text; they are decoded and, for
/// `zlib`, inflated. An empty binary payload yields `None`: nothing is
/// inserted.
///
/// # Errors
///
/// `PayloadDecode` when a binary payload is not a string, is not valid
/// base64, or does not inflate.
pub fn decode_payload(
    table_spec_name: &str,
    payload: &serde_json::Value,
    payload_type: PayloadType,
    compression: PayloadCompression,
) -> Result<Option<InsertData>> {
    let decode_err = |reason: String| DucklingError::PayloadDecode {
        table_spec_name: table_spec_name.to_string(),
        reason,
    };

    match payload_type {
        PayloadType::Json => Ok(Some(InsertData::Json(payload.clone()))),
        PayloadType::BinaryIpc => {
            let encoded = payload
                .as_str()
                .ok_or_else(|| decode_err("binary payload must be a base64 string".to_string()))?;
            if encoded.is_empty() {
                return Ok(None);
            }

            let bytes = STANDARD
                .decode(encoded.trim())
                .map_err(|e| decode_err(format!("invalid base64: {}", e)))?;

            let bytes = match compression {
                PayloadCompression::None => bytes,
                PayloadCompression::Zlib => {
                    let mut inflated = Vec::new();
                    ZlibDecoder::new(bytes.as_slice())
                        .read_to_end(&mut inflated)
                        .map_err(|e| decode_err(format!("zlib inflate failed: {}", e)))?;
                    inflated
                }
            };

            Ok(Some(InsertData::Bytes(bytes)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use serde_json::json;
    use std::io::Write;

    fn zlib(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_json_passes_through() {
        let rows = json!([{"a": 1}]);
        let data = decode_payload("t", &rows, PayloadType::Json, PayloadCompression::Zlib).unwrap();
        assert_eq!(data, Some(InsertData::Json(rows)));
    }

    #[test]
    fn test_binary_plain_base64() {
        let payload = json!(STANDARD.encode(b"columnar"));
        let data =
            decode_payload("t", &payload, PayloadType::BinaryIpc, PayloadCompression::None)
                .unwrap();
        assert_eq!(data, Some(InsertData::Bytes(b"columnar".to_vec())));
    }

    #[test]
    fn test_binary_zlib_inflates() {
        let payload = json!(STANDARD.encode(zlib(b"compressed columnar bytes")));
        let data =
            decode_payload("t", &payload, PayloadType::BinaryIpc, PayloadCompression::Zlib)
                .unwrap();
        assert_eq!(
            data,
            Some(InsertData::Bytes(b"compressed columnar bytes".to_vec()))
        );
    }

    #[test]
    fn test_empty_binary_inserts_nothing() {
        let data =
            decode_payload("t", &json!(""), PayloadType::BinaryIpc, PayloadCompression::None)
                .unwrap();
        assert_eq!(data, None);
    }

    #[test]
    fn test_bad_inputs_are_decode_errors() {
        let cases = [
            (json!(42), PayloadCompression::None),
            (json!("***not base64***"), PayloadCompression::None),
            (json!(STANDARD.encode(b"not zlib")), PayloadCompression::Zlib),
        ];
        for (payload, compression) in cases {
            let err = decode_payload("t", &payload, PayloadType::BinaryIpc, compression)
                .unwrap_err();
            assert!(
                matches!(err, DucklingError::PayloadDecode { ref table_spec_name, .. } if table_spec_name == "t"),
                "{err:?}"
            );
        }
    }
}
