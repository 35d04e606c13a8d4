use mondo_ingest_core::{
    map::Mapper, normalize::normalize, raw_node::RawNode, record::OntologyType,
    subset::SubsetPolicy,
};
use mondo_ingest_test_utils::{
    nodes::{neoplasm, node},
    system::{fixed_time, frozen_system},
};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn duplicates_merge_into_one_record() {
    let normalized = normalize(
        [
            RawNode::new("M:1").with_synonyms(["Foo", "foo", "Bar"]),
            RawNode::new("m:1 ").with_synonyms(["FOO", "Baz"]),
        ],
        false,
        &SubsetPolicy::default(),
    );

    assert_eq!(normalized.records.len(), 1);
    let record = &normalized.records[0];
    assert_eq!(record.mondo_id, "M:1");
    assert_eq!(record.synonyms, vec!["Foo", "Bar", "Baz"]);
    assert_eq!(record.disease_name, "Foo");
    assert_eq!(normalized.stats.merged_duplicates, 1);
}

#[test]
fn filtered_parent_is_still_referenced() {
    let normalized = normalize(
        [
            node("M:1", "disease of cellular proliferation"),
            neoplasm("M:2", "neoplasm").with_parents(["M:1"]),
        ],
        true,
        &SubsetPolicy::default(),
    );

    assert_eq!(normalized.records.len(), 1);
    let record = &normalized.records[0];
    assert_eq!(record.mondo_id, "M:2");
    assert_eq!(record.ontology_type, OntologyType::Neoplastic);
    assert_eq!(record.parent_ids.iter().collect::<Vec<_>>(), vec!["M:1"]);
    assert!(record.unresolved_parents.is_empty());
    assert_eq!(normalized.stats.filtered_out, 1);
}

#[test]
fn rows_round_trip_source_json() {
    let raw = json!({
        "id": "http://purl.obolibrary.org/obo/MONDO_0007254",
        "lbl": "breast cancer",
        "meta": {
            "synonyms": [{ "val": "malignant tumor of breast", "pred": "hasExactSynonym" }],
            "xrefs": [{ "val": "DOID:1612" }, { "val": "NCIT:C9335" }]
        },
        "type": "CLASS"
    });
    let normalized = normalize(
        [RawNode::new("MONDO:0007254")
            .with_label("breast cancer")
            .with_synonyms(["malignant tumor of breast"])
            .with_raw(raw.clone())],
        false,
        &SubsetPolicy::default(),
    );

    let system = frozen_system(fixed_time());
    let mapped = Mapper::new(system.as_ref()).map(&normalized.records);
    let row = &mapped.rows[0];

    assert_eq!(row.created_at, fixed_time());
    let decoded = row.decode_source_json().unwrap();
    assert_eq!(decoded, raw);
    assert_eq!(
        mondo_ingest_core::map::canonical_json(&decoded).unwrap(),
        row.source_json
    );
    assert_eq!(
        row.decode_synonyms().unwrap(),
        vec!["malignant tumor of breast"]
    );
}

#[test]
fn malformed_nodes_are_reported_not_fatal() {
    let normalized = normalize(
        [
            node("M:1", "first"),
            RawNode {
                id: None,
                ..node("", "orphan")
            },
            node("  ", "blank"),
            RawNode::new("M:2"),
        ],
        false,
        &SubsetPolicy::default(),
    );

    assert_eq!(
        normalized
            .records
            .iter()
            .map(|record| record.mondo_id.as_str())
            .collect::<Vec<_>>(),
        vec!["M:1"]
    );
    assert_eq!(normalized.stats.malformed, 3);
    assert_eq!(normalized.issues.len(), 3);
}
