//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions to encode and decode keys for the record store
//! and the aggregate tables. All keys are designed to support efficient prefix
//! scans, and every variable-length component is length-prefixed so that one
//! collection's prefix can never be a prefix of another's (`C1` vs `C10`).
//!
//! Timestamps are encoded as big-endian microseconds with the sign bit flipped,
//! so byte order matches chronological order across the epoch.

use chrono::{DateTime, Utc};
use pulse_core::{CollectionCode, Facet, Granularity, RecordId};

/// Marker byte for records without a bucketing timestamp.
pub const TS_ABSENT: u8 = 0;

/// Marker byte for records with a bucketing timestamp.
pub const TS_PRESENT: u8 = 1;

const SIGN_BIT: u64 = 1 << 63;

/// Encode a timestamp as 8 order-preserving bytes.
#[must_use]
pub fn encode_ts(ts: DateTime<Utc>) -> [u8; 8] {
    #[allow(clippy::cast_sign_loss)]
    let raw = ts.timestamp_micros() as u64;
    (raw ^ SIGN_BIT).to_be_bytes()
}

/// Decode a timestamp written by [`encode_ts`].
///
/// Returns `None` if fewer than 8 bytes are given.
#[must_use]
pub fn decode_ts(bytes: &[u8]) -> Option<DateTime<Utc>> {
    let arr: [u8; 8] = bytes.get(..8)?.try_into().ok()?;
    #[allow(clippy::cast_possible_wrap)]
    let micros = (u64::from_be_bytes(arr) ^ SIGN_BIT) as i64;
    DateTime::from_timestamp_micros(micros)
}

/// Encode a collection prefix: `len(code) as u16 || code`.
#[must_use]
pub fn code_prefix(code: &CollectionCode) -> Vec<u8> {
    let bytes = code.as_bytes();
    let mut key = Vec::with_capacity(2 + bytes.len());
    // CollectionCode::MAX_LEN keeps this in range.
    let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(bytes);
    key
}

fn push_value(key: &mut Vec<u8>, value: &str) {
    let len = u32::try_from(value.len()).unwrap_or(u32::MAX);
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(value.as_bytes());
}

/// Encode a record key: `code || marker || timestamp? || record_id`.
///
/// Records without a timestamp sort before all timestamped records of the
/// same collection.
#[must_use]
pub fn record_key(
    code: &CollectionCode,
    timestamp: Option<DateTime<Utc>>,
    record_id: &RecordId,
) -> Vec<u8> {
    let mut key = code_prefix(code);
    match timestamp {
        Some(ts) => {
            key.push(TS_PRESENT);
            key.extend_from_slice(&encode_ts(ts));
        }
        None => key.push(TS_ABSENT),
    }
    key.extend_from_slice(record_id.as_bytes());
    key
}

/// Prefix of all timestamped records in a collection.
#[must_use]
pub fn timestamped_prefix(code: &CollectionCode) -> Vec<u8> {
    let mut key = code_prefix(code);
    key.push(TS_PRESENT);
    key
}

/// Seek key for the first timestamped record at or after `ts`.
#[must_use]
pub fn timestamped_seek(code: &CollectionCode, ts: DateTime<Utc>) -> Vec<u8> {
    let mut key = timestamped_prefix(code);
    key.extend_from_slice(&encode_ts(ts));
    key
}

/// Extract the timestamp from a record key of the given collection.
///
/// Returns `None` for records stored without a timestamp.
#[must_use]
pub fn record_key_timestamp(code: &CollectionCode, key: &[u8]) -> Option<DateTime<Utc>> {
    let offset = 2 + code.as_bytes().len();
    match key.get(offset) {
        Some(&TS_PRESENT) => decode_ts(key.get(offset + 1..)?),
        _ => None,
    }
}

/// Encode a facet-value index key: `facet || value || code`.
#[must_use]
pub fn facet_value_key(facet: Facet, value: &str, code: &CollectionCode) -> Vec<u8> {
    let mut key = facet_prefix(facet);
    push_value(&mut key, value);
    key.extend_from_slice(&code_prefix(code));
    key
}

/// Encode a facet prefix for scanning all values of a facet.
#[must_use]
pub fn facet_prefix(facet: Facet) -> Vec<u8> {
    vec![facet.as_u8()]
}

/// Split a facet-value index key into its value and collection code bytes.
#[must_use]
pub fn decode_facet_value_key(key: &[u8]) -> Option<(&str, &[u8])> {
    let len_bytes: [u8; 4] = key.get(1..5)?.try_into().ok()?;
    let value_end = 5 + u32::from_be_bytes(len_bytes) as usize;
    let value = std::str::from_utf8(key.get(5..value_end)?).ok()?;

    let code_len_bytes: [u8; 2] = key.get(value_end..value_end + 2)?.try_into().ok()?;
    let code_start = value_end + 2;
    let code = key.get(code_start..code_start + u16::from_be_bytes(code_len_bytes) as usize)?;
    Some((value, code))
}

/// Prefix of one collection's aggregates at a granularity: `code || granularity`.
#[must_use]
pub fn time_aggregate_prefix(code: &CollectionCode, granularity: Granularity) -> Vec<u8> {
    let mut key = code_prefix(code);
    key.push(granularity.as_u8());
    key
}

/// Encode a time-bucket aggregate key: `code || granularity || bucket`.
#[must_use]
pub fn time_aggregate_key(
    code: &CollectionCode,
    granularity: Granularity,
    bucket: DateTime<Utc>,
) -> Vec<u8> {
    let mut key = time_aggregate_prefix(code, granularity);
    key.extend_from_slice(&encode_ts(bucket));
    key
}

/// Prefix of one collection's aggregates for a facet: `code || facet`.
#[must_use]
pub fn facet_aggregate_prefix(code: &CollectionCode, facet: Facet) -> Vec<u8> {
    let mut key = code_prefix(code);
    key.push(facet.as_u8());
    key
}

/// Encode a facet aggregate key: `code || facet || value || bucket`.
#[must_use]
pub fn facet_aggregate_key(
    code: &CollectionCode,
    facet: Facet,
    value: &str,
    bucket: DateTime<Utc>,
) -> Vec<u8> {
    let mut key = facet_aggregate_prefix(code, facet);
    push_value(&mut key, value);
    key.extend_from_slice(&encode_ts(bucket));
    key
}

/// Smallest key greater than every key starting with `prefix`.
///
/// Returns `None` when the prefix is all `0xFF` bytes and has no upper bound.
#[must_use]
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn code(s: &str) -> CollectionCode {
        CollectionCode::new(s).unwrap()
    }

    #[test]
    fn timestamp_encoding_preserves_order() {
        let before = Utc.with_ymd_and_hms(1969, 6, 1, 0, 0, 0).unwrap();
        let epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2021, 1, 1, 10, 5, 0).unwrap();

        assert!(encode_ts(before) < encode_ts(epoch));
        assert!(encode_ts(epoch) < encode_ts(after));
        assert_eq!(decode_ts(&encode_ts(before)), Some(before));
        assert_eq!(decode_ts(&encode_ts(after)), Some(after));
        assert_eq!(decode_ts(&[1, 2, 3]), None);
    }

    #[test]
    fn code_prefixes_do_not_nest() {
        let short = code_prefix(&code("C1"));
        let long = code_prefix(&code("C10"));
        assert!(!long.starts_with(&short));
    }

    #[test]
    fn record_key_orders_untimed_first() {
        let c = code("C1");
        let id = RecordId::from_bytes([7u8; 32]);
        let ts = Utc.with_ymd_and_hms(2021, 1, 1, 10, 5, 0).unwrap();

        let untimed = record_key(&c, None, &id);
        let timed = record_key(&c, Some(ts), &id);
        assert!(untimed < timed);
        assert!(timed.starts_with(&timestamped_prefix(&c)));
        assert!(!untimed.starts_with(&timestamped_prefix(&c)));

        assert_eq!(record_key_timestamp(&c, &timed), Some(ts));
        assert_eq!(record_key_timestamp(&c, &untimed), None);
    }

    #[test]
    fn facet_value_key_roundtrip() {
        let c = code("quake");
        let key = facet_value_key(Facet::Sentiment, "positive", &c);
        assert!(key.starts_with(&facet_prefix(Facet::Sentiment)));

        let (value, code_bytes) = decode_facet_value_key(&key).unwrap();
        assert_eq!(value, "positive");
        assert_eq!(code_bytes, b"quake");
    }

    #[test]
    fn aggregate_keys_share_job_prefix() {
        let c = code("C1");
        let bucket = Utc.with_ymd_and_hms(2021, 1, 1, 10, 0, 0).unwrap();

        let time_key = time_aggregate_key(&c, Granularity::Hour, bucket);
        assert!(time_key.starts_with(&time_aggregate_prefix(&c, Granularity::Hour)));
        assert!(!time_key.starts_with(&time_aggregate_prefix(&c, Granularity::Day)));

        let facet_key = facet_aggregate_key(&c, Facet::Label, "caution", bucket);
        assert!(facet_key.starts_with(&facet_aggregate_prefix(&c, Facet::Label)));
    }

    #[test]
    fn prefix_end_bounds_prefix() {
        let prefix = vec![0, 2, b'C', b'1', 3];
        let end = prefix_end(&prefix).unwrap();
        assert_eq!(end, vec![0, 2, b'C', b'1', 4]);

        let mut inside = prefix.clone();
        inside.extend_from_slice(&[0xFF; 8]);
        assert!(inside < end);

        assert_eq!(prefix_end(&[1, 0xFF]), Some(vec![2]));
        assert_eq!(prefix_end(&[0xFF, 0xFF]), None);
    }
}
