//! Correlation ids for queued work
//!
//! Every load accepted into the catalog queue carries a `RequestId` so that
//! its queueing, start and deferred completion can be tied together in the
//! logs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a single command or load request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new random RequestId using UUIDv7
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Create from an existing string (for deserialization)
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_generation() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();

        assert_ne!(id1, id2);
        assert!(!id1.as_str().is_empty());
    }

    #[test]
    fn test_request_id_display() {
        let id = RequestId::new();
        assert_eq!(format!("{}", id), id.as_str());
    }

    #[test]
    fn test_request_id_serialization() {
        let id = RequestId::from_string("load-1".to_string());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"load-1\"");
        let back: RequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
