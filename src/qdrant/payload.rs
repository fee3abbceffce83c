//! Conversion between chunk records and Qdrant payload objects.

use crate::store::ChunkMetadata;
use serde_json::{Map, Value};

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(text: &str, metadata: &ChunkMetadata) -> Value {
    let mut payload = match serde_json::to_value(metadata) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    payload.insert("text".into(), Value::String(text.to_string()));
    Value::Object(payload)
}

/// Split a stored payload back into chunk text and metadata.
///
/// Returns `None` for points that were not written by this crate.
pub(crate) fn parse_payload(mut payload: Map<String, Value>) -> Option<(String, ChunkMetadata)> {
    let text = match payload.remove("text") {
        Some(Value::String(text)) => text,
        _ => return None,
    };
    let metadata = serde_json::from_value(Value::Object(payload)).ok()?;
    Some((text, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ChunkMetadata {
        ChunkMetadata {
            source: "/tmp/report.pdf".into(),
            document: "report.pdf".into(),
            stored_path: "uploads/report.pdf".into(),
            chunk_index: 2,
            chunk_hash: "abc123".into(),
            ingested_at: "2025-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn payload_includes_metadata_and_text() {
        let payload = build_payload("sample", &metadata());
        assert_eq!(payload["text"], "sample");
        assert_eq!(payload["source"], "/tmp/report.pdf");
        assert_eq!(payload["document"], "report.pdf");
        assert_eq!(payload["chunk_index"], 2);
    }

    #[test]
    fn parse_payload_restores_metadata() {
        let Value::Object(map) = build_payload("sample", &metadata()) else {
            panic!("payload must be an object");
        };
        let (text, parsed) = parse_payload(map).expect("parsed");
        assert_eq!(text, "sample");
        assert_eq!(parsed, metadata());
    }

    #[test]
    fn foreign_payloads_are_skipped() {
        let mut map = Map::new();
        map.insert("text".into(), Value::String("orphan".into()));
        assert!(parse_payload(map).is_none());
    }
}
