use duckling_core_types::RequestId;
use serde::{Deserialize, Serialize};

/// Encoding of a load payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadType {
    /// Row records, passed to the engine as-is
    Json,
    /// Base64 text of a columnar binary stream
    BinaryIpc,
}

/// Compression applied to a binary payload before base64 encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadCompression {
    #[default]
    None,
    Zlib,
}

/// A load request waiting in the catalog's mutation queue
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTableLoad {
    pub request_id: RequestId,
    pub table_spec_name: String,
    pub payload: serde_json::Value,
    pub payload_type: PayloadType,
    pub payload_compression: PayloadCompression,
}

impl PendingTableLoad {
    /// Row-record payload
    pub fn json(table_spec_name: impl Into<String>, rows: serde_json::Value) -> Self {
        Self {
            request_id: RequestId::new(),
            table_spec_name: table_spec_name.into(),
            payload: rows,
            payload_type: PayloadType::Json,
            payload_compression: PayloadCompression::None,
        }
    }

    /// Base64 binary payload, optionally zlib-compressed
    pub fn binary(
        table_spec_name: impl Into<String>,
        base64_payload: impl Into<String>,
        compression: PayloadCompression,
    ) -> Self {
        Self {
            request_id: RequestId::new(),
            table_spec_name: table_spec_name.into(),
            payload: serde_json::Value::String(base64_payload.into()),
            payload_type: PayloadType::BinaryIpc,
            payload_compression: compression,
        }
    }
}
