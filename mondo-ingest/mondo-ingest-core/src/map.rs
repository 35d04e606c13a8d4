use serde_json::Value;
use tracing::debug;

use crate::{
    IngestError, IngestResult,
    record::NormalizedRecord,
    report::RecordIssue,
    row::Row,
    system::SystemAPI,
};

/// Output of [Mapper::map].
#[derive(Clone, Debug, Default)]
pub struct Mapped {
    pub rows: Vec<Row>,
    pub issues: Vec<RecordIssue>,
}

/// Turns normalized records into storage rows.
pub struct Mapper<'a> {
    system: &'a dyn SystemAPI,
}

impl<'a> Mapper<'a> {
    pub fn new(system: &'a dyn SystemAPI) -> Self {
        Self { system }
    }

    /// Map records one to one. The clock is read once, so all rows of one call
    /// share the same `created_at`.
    pub fn map(&self, records: &[NormalizedRecord]) -> Mapped {
        let created_at = self.system.current_time();
        let mut mapped = Mapped::default();

        for record in records {
            match map_record(record, created_at) {
                Ok(row) => mapped.rows.push(row),
                Err(error) => {
                    debug!("could not map `{}`: {error}", record.mondo_id);
                    mapped.issues.push(RecordIssue::new(
                        Some(record.mondo_id.clone()),
                        error.to_string(),
                    ));
                }
            }
        }

        mapped
    }
}

fn map_record(
    record: &NormalizedRecord,
    created_at: chrono::DateTime<chrono::Utc>,
) -> IngestResult<Row> {
    Ok(Row {
        mondo_id: record.mondo_id.clone(),
        disease_name: record.disease_name.clone(),
        synonyms: encode_list(record.synonyms.iter())?,
        parent_ids: encode_list(record.parent_ids.iter())?,
        definition: non_empty(&record.definition),
        ontology_type: non_empty(record.ontology_type.as_str()),
        source_json: canonical_json(&record.source_json)?,
        created_at,
    })
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// JSON array text, safe for any character inside the elements.
fn encode_list<'s>(items: impl Iterator<Item = &'s String>) -> IngestResult<String> {
    serde_json::to_string(&items.collect::<Vec<_>>())
        .map_err(|err| IngestError::malformed(format!("list encoding: {err}")))
}

/// Compact JSON text with object keys in sorted order.
pub fn canonical_json(value: &Value) -> IngestResult<String> {
    serde_json::to_string(&sorted(value))
        .map_err(|err| IngestError::malformed(format!("source encoding: {err}")))
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut entries: Vec<_> = object.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));

            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), sorted(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
