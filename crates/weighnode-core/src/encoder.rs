//! `/data` response encoding.
//!
//! A reading becomes `{"weight":<n>}`, or `{"id":"<bin>","weight":<n>}` when
//! the node has a bin identifier. The text lives in a fixed-capacity buffer;
//! encoding either produces the complete document or an error, never a
//! truncated one.

use heapless::String as BoundedString;
use serde::Serialize;
use thiserror::Error;

use crate::model::SensorReading;

/// Capacity of the response buffer.
///
/// Large enough for `{"weight":-2147483648}` plus a bin identifier of up to
/// 34 bytes.
pub const PAYLOAD_CAPACITY: usize = 64;

/// Body served when encoding fails.
pub const FALLBACK_BODY: &str = r#"{"weight":0}"#;

/// Errors that can occur during payload encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The document does not fit the buffer.
    #[error("Payload needs {needed} bytes, capacity is {capacity}")]
    Overflow { needed: usize, capacity: usize },

    /// JSON serialization failed.
    #[error("Failed to serialize payload: {0}")]
    SerializeError(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct WeightDocument<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    weight: i32,
}

/// A complete JSON document in a buffer of `N` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPayload<const N: usize = PAYLOAD_CAPACITY> {
    text: BoundedString<N>,
}

impl<const N: usize> JsonPayload<N> {
    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub const fn capacity() -> usize {
        N
    }
}

/// Encode a reading into a buffer of `N` bytes.
pub fn encode<const N: usize>(
    reading: SensorReading,
    bin_id: Option<&str>,
) -> Result<JsonPayload<N>, EncodeError> {
    let document = WeightDocument {
        id: bin_id,
        weight: reading.value(),
    };
    let json = serde_json::to_string(&document)?;

    let mut text = BoundedString::<N>::new();
    text.push_str(&json).map_err(|_| EncodeError::Overflow {
        needed: json.len(),
        capacity: N,
    })?;

    Ok(JsonPayload { text })
}

/// Encoded length of the widest possible reading for this bin id.
pub fn worst_case_len(bin_id: Option<&str>) -> Result<usize, EncodeError> {
    let document = WeightDocument {
        id: bin_id,
        weight: i32::MIN,
    };
    Ok(serde_json::to_string(&document)?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reading(value: i32) -> SensorReading {
        SensorReading::new(value)
    }

    #[test]
    fn test_encode_weight_only() {
        let payload: JsonPayload = encode(reading(1234), None).unwrap();
        assert_eq!(payload.as_str(), r#"{"weight":1234}"#);
    }

    #[test]
    fn test_encode_with_id() {
        let payload: JsonPayload = encode(reading(-7), Some("bin-3")).unwrap();
        assert_eq!(payload.as_str(), r#"{"id":"bin-3","weight":-7}"#);
    }

    #[test]
    fn test_sentinel_encodes_as_zero() {
        let payload: JsonPayload = encode(SensorReading::SENTINEL, None).unwrap();
        assert_eq!(payload.as_str(), FALLBACK_BODY);
    }

    #[test]
    fn test_extremes_fit_observed_capacity() {
        for value in [0, i32::MAX, i32::MIN] {
            let payload = encode::<30>(reading(value), None).unwrap();
            assert!(payload.len() <= JsonPayload::<30>::capacity());
            let parsed: serde_json::Value = serde_json::from_str(payload.as_str()).unwrap();
            assert_eq!(parsed["weight"], value);
        }
    }

    #[test]
    fn test_overflow_fails_closed() {
        let err = encode::<30>(reading(i32::MIN), Some("loading-dock-bin")).unwrap_err();
        match err {
            EncodeError::Overflow { needed, capacity } => {
                assert_eq!(capacity, 30);
                assert!(needed > 30);
            }
            other => panic!("Expected Overflow, got {:?}", other),
        }
    }

    #[test]
    fn test_id_is_escaped() {
        let payload: JsonPayload = encode(reading(1), Some("a\"b")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(payload.as_str()).unwrap();
        assert_eq!(parsed["id"], "a\"b");
    }

    #[test]
    fn test_worst_case_len() {
        assert_eq!(worst_case_len(None).unwrap(), r#"{"weight":-2147483648}"#.len());
        assert_eq!(
            worst_case_len(Some("abcd")).unwrap(),
            r#"{"id":"abcd","weight":-2147483648}"#.len()
        );
        // The largest id the default buffer accepts.
        let id = "x".repeat(PAYLOAD_CAPACITY - 30);
        assert_eq!(worst_case_len(Some(&id)).unwrap(), PAYLOAD_CAPACITY);
    }
}
