//! Line codec for the correction log.
//!
//! Each entry occupies exactly one line:
//! ```text
//! [crc32: 8 lowercase hex][\t][record: JSON]\n
//! ```
//! The checksum covers the JSON bytes. Lines that start directly with `{` are
//! accepted without a checksum so hand-edited logs replay too.

use chrono::{DateTime, NaiveDateTime, Utc};
use crc32fast::Hasher;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

const CHECKSUM_HEX_LEN: usize = 8;

/// A persisted correction as it appears in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// The query as the user typed it.
    pub original_query: String,
    /// What the cascade predicted before the correction.
    #[serde(default)]
    pub predicted_name: String,
    /// The confirmed canonical name.
    #[serde(alias = "correct_name")]
    pub canonical_name: String,
    /// When the correction was recorded.
    #[serde(alias = "timestamp", deserialize_with = "deserialize_timestamp")]
    pub recorded_at: DateTime<Utc>,
}

/// Why a log line could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("line is blank")]
    Blank,

    #[error("missing or malformed checksum prefix")]
    MalformedPrefix,

    #[error("CRC mismatch: stored={stored:08x}, computed={computed:08x}")]
    ChecksumMismatch {
        stored: u32,
        computed: u32,
    },

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Encodes a record as one newline-terminated log line.
///
/// # Errors
/// Returns the serializer error if the record cannot be encoded.
pub fn encode_line(record: &LogRecord) -> Result<Vec<u8>, serde_json::Error> {
    let data = serde_json::to_vec(record)?;
    let prefix = format!("{:08x}\t", checksum(&data));

    let mut out = Vec::with_capacity(prefix.len() + data.len() + 1);
    out.extend_from_slice(prefix.as_bytes());
    out.extend_from_slice(&data);
    out.push(b'\n');
    Ok(out)
}

/// Decodes one log line (without its trailing newline).
///
/// # Errors
/// See [`DecodeError`].
pub fn decode_line(line: &str) -> Result<LogRecord, DecodeError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(DecodeError::Blank);
    }

    let json = if line.starts_with('{') {
        line
    } else {
        let (prefix, json) = line.split_once('\t').ok_or(DecodeError::MalformedPrefix)?;
        if prefix.len() != CHECKSUM_HEX_LEN {
            return Err(DecodeError::MalformedPrefix);
        }
        let stored = u32::from_str_radix(prefix, 16).map_err(|_| DecodeError::MalformedPrefix)?;
        let computed = checksum(json.as_bytes());
        if stored != computed {
            return Err(DecodeError::ChecksumMismatch { stored, computed });
        }
        json
    };

    serde_json::from_str(json).map_err(|e| DecodeError::InvalidRecord(e.to_string()))
}

/// Accepts RFC 3339 timestamps and naive ISO-8601 ones (read as UTC).
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LogRecord {
        LogRecord {
            original_query: "Unknown Widgets".to_string(),
            predicted_name: "株式会社Unknown Widgets".to_string(),
            canonical_name: "Widgets Group LLC".to_string(),
            recorded_at: DateTime::parse_from_rfc3339("2024-05-01T09:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn test_encoded_line_shape() {
        let line = encode_line(&sample()).unwrap();
        let text = String::from_utf8(line).unwrap();
        assert!(text.ends_with('\n'));
        assert_eq!(text.matches('\n').count(), 1);
        let (prefix, _) = text.split_once('\t').unwrap();
        assert_eq!(prefix.len(), 8);

        let decoded = decode_line(&text).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_detects_corruption() {
        let mut text = String::from_utf8(encode_line(&sample()).unwrap()).unwrap();
        text = text.replace("Widgets Group", "Gadgets Group");
        assert!(matches!(
            decode_line(&text),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_accepts_bare_legacy_json() {
        let line = r#"{"original_query":"マック","correct_name":"日本マクドナルド株式会社","timestamp":"2024-07-01T12:00:00.123456"}"#;
        let record = decode_line(line).unwrap();
        assert_eq!(record.canonical_name, "日本マクドナルド株式会社");
        assert_eq!(record.predicted_name, "");
        assert_eq!(record.recorded_at.to_rfc3339(), "2024-07-01T12:00:00.123456+00:00");
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(decode_line("   "), Err(DecodeError::Blank));
        assert_eq!(decode_line("not a record"), Err(DecodeError::MalformedPrefix));
        assert_eq!(decode_line("zzzzzzzz\t{}"), Err(DecodeError::MalformedPrefix));
        assert!(matches!(
            decode_line("{\"original_query\": 3"),
            Err(DecodeError::InvalidRecord(_))
        ));
    }
}
