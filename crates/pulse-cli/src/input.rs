//! JSON Lines record input for the `load` command.

use std::io::BufRead;

use anyhow::Context;
use chrono::{DateTime, Utc};
use pulse_core::{CollectionCode, Facet};
use pulse_store::RawRecord;
use serde::Deserialize;

/// One input line.
///
/// `updated_at` defaults to `created_at`; an explicit `null` leaves the record
/// without a bucketing timestamp. Lines without an `id` are always stored as
/// new records.
#[derive(Debug, Deserialize)]
pub struct RecordInput {
    #[serde(default)]
    pub id: Option<String>,
    pub code: String,
    pub created_at: DateTime<Utc>,
    #[serde(default = "RecordInput::unset", deserialize_with = "explicit_option")]
    pub updated_at: Option<Option<DateTime<Utc>>>,
    pub text: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub sentiment: Option<String>,
    #[serde(default)]
    pub damage: Option<String>,
    #[serde(default)]
    pub image_relevancy: Option<String>,
}

/// Distinguish an absent field from an explicit `null`.
fn explicit_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl RecordInput {
    const fn unset() -> Option<Option<DateTime<Utc>>> {
        None
    }

    /// Convert into a storable record.
    pub fn into_record(self) -> anyhow::Result<RawRecord> {
        let code = CollectionCode::new(&self.code)
            .with_context(|| format!("invalid collection code {:?}", self.code))?;

        let mut record = RawRecord::new(code, self.created_at, self.text);
        if let Some(id) = &self.id {
            record = record.with_source_id(id);
        }
        if let Some(image) = self.image {
            record = record.with_image(image);
        }
        if let Some(updated_at) = self.updated_at {
            record = record.with_timestamp(updated_at);
        }

        let facets = [
            (Facet::Label, self.label),
            (Facet::Sentiment, self.sentiment),
            (Facet::Damage, self.damage),
            (Facet::ImageRelevancy, self.image_relevancy),
        ];
        for (facet, value) in facets {
            if let Some(value) = value {
                record = record.with_facet(facet, value);
            }
        }

        Ok(record)
    }
}

/// Parse every non-blank line of a JSON Lines stream.
pub fn read_records(reader: impl BufRead) -> anyhow::Result<Vec<RawRecord>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let input: RecordInput = serde_json::from_str(&line)
            .with_context(|| format!("line {}: malformed record", index + 1))?;
        records.push(
            input
                .into_record()
                .with_context(|| format!("line {}", index + 1))?,
        );
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reads_facets_and_image() {
        let data = r#"
{"code":"C1","created_at":"2021-01-01T10:05:00Z","text":"a","sentiment":"positive","image":"img/a.jpg"}

{"code":"C1","created_at":"2021-01-01T10:40:00Z","text":"b","label":"caution"}
"#;
        let records = read_records(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].facet(Facet::Sentiment), Some("positive"));
        assert_eq!(records[0].image.as_deref(), Some("img/a.jpg"));
        assert_eq!(records[1].facet(Facet::Label), Some("caution"));
    }

    #[test]
    fn updated_at_controls_timestamp() {
        let data = concat!(
            r#"{"code":"C1","created_at":"2021-01-01T10:05:00Z","text":"default"}"#,
            "\n",
            r#"{"code":"C1","created_at":"2021-01-01T10:05:00Z","updated_at":"2021-01-02T00:00:00Z","text":"later"}"#,
            "\n",
            r#"{"code":"C1","created_at":"2021-01-01T10:05:00Z","updated_at":null,"text":"untimed"}"#,
        );
        let records = read_records(data.as_bytes()).unwrap();
        assert_eq!(
            records[0].timestamp,
            Some(Utc.with_ymd_and_hms(2021, 1, 1, 10, 5, 0).unwrap())
        );
        assert_eq!(
            records[1].timestamp,
            Some(Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap())
        );
        assert_eq!(records[2].timestamp, None);
    }

    #[test]
    fn source_ids_key_records() {
        let data = concat!(
            r#"{"id":"1001","code":"C1","created_at":"2021-01-01T10:05:00Z","text":"RT flood warning"}"#,
            "\n",
            r#"{"id":"1001","code":"C1","created_at":"2021-01-01T10:05:00Z","text":"RT flood warning"}"#,
            "\n",
            r#"{"code":"C1","created_at":"2021-01-01T10:05:00Z","text":"RT flood warning"}"#,
            "\n",
            r#"{"code":"C1","created_at":"2021-01-01T10:05:00Z","text":"RT flood warning"}"#,
        );
        let records = read_records(data.as_bytes()).unwrap();
        assert_eq!(records[0].record_id, records[1].record_id);
        assert_ne!(records[2].record_id, records[3].record_id);
        assert_ne!(records[0].record_id, records[2].record_id);
    }

    #[test]
    fn rejects_blank_code() {
        let data = r#"{"code":"  ","created_at":"2021-01-01T10:05:00Z","text":"a"}"#;
        let err = read_records(data.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
