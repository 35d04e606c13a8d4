//! The OBO-Graphs JSON format, as published in `mondo.json`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use fnv::FnvHashMap;
use indexmap::IndexSet;
use mondo_ingest_core::{IngestError, IngestResult, fetch::FetchedOntology, raw_node::RawNode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const IS_A: &str = "is_a";
const UNKNOWN_VERSION: &str = "unknown";

/// Property predicates carrying a change date, most specific first.
const DATE_PREDICATES: [&str; 3] = ["terms/date", "terms:date", "#creation_date"];

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    graphs: Vec<Graph>,
}

#[derive(Deserialize)]
struct Graph {
    #[serde(default)]
    nodes: Vec<Value>,
    #[serde(default)]
    edges: Vec<Edge>,
    #[serde(default)]
    meta: Option<GraphMeta>,
}

#[derive(Deserialize)]
struct GraphMeta {
    version: Option<String>,
    #[serde(rename = "versionInfo")]
    version_info: Option<String>,
    #[serde(rename = "basicPropertyValues", default)]
    property_values: Vec<PropertyValue>,
}

#[derive(Deserialize)]
struct PropertyValue {
    pred: Option<String>,
    val: Option<String>,
}

#[derive(Deserialize)]
struct Edge {
    sub: String,
    pred: String,
    obj: String,
}

#[derive(Deserialize)]
struct Node {
    lbl: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    meta: Option<NodeMeta>,
}

#[derive(Default, Deserialize)]
struct NodeMeta {
    definition: Option<Val>,
    #[serde(default)]
    synonyms: Vec<Val>,
    #[serde(default)]
    subsets: Vec<String>,
    #[serde(default)]
    xrefs: Vec<Val>,
    #[serde(rename = "basicPropertyValues", default)]
    property_values: Vec<PropertyValue>,
    #[serde(default)]
    deprecated: bool,
}

#[derive(Deserialize)]
struct Val {
    val: Option<String>,
}

/// Parse an OBO-Graphs document into MONDO raw nodes.
///
/// Only `graphs[0]` is read. Nodes of other ontologies are ignored. Nodes without an id,
/// or with an id but an unexpected shape, are passed on as unreadable.
pub fn parse_document(json: &[u8], include_obsolete: bool) -> IngestResult<FetchedOntology> {
    let document: Document = serde_json::from_slice(json)
        .map_err(|error| IngestError::fatal(format!("invalid OBO-Graphs JSON: {error}")))?;

    let Some(graph) = document.graphs.into_iter().next() else {
        return Err(IngestError::fatal(
            "invalid OBO-Graphs JSON: expected graphs[0] to exist",
        ));
    };

    let release_version = graph
        .meta
        .as_ref()
        .map(release_version)
        .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
    let parents = parent_index(&graph.edges);

    let mut nodes = Vec::with_capacity(graph.nodes.len());
    let mut ignored = 0;
    let mut obsolete = 0;

    for raw in graph.nodes {
        let id = raw.get("id").and_then(Value::as_str);
        let curie = id.and_then(mondo_curie);
        if id.is_some() && curie.is_none() {
            ignored += 1;
            continue;
        }

        let node = match Node::deserialize(&raw) {
            Ok(node) => node,
            Err(error) => {
                nodes.push(unreadable(curie, raw, format!("unexpected node shape: {error}")));
                continue;
            }
        };
        let Some(curie) = curie else {
            nodes.push(unreadable(None, raw, "node has no id".to_string()));
            continue;
        };
        if node.kind.as_deref().is_some_and(|kind| kind != "CLASS") {
            ignored += 1;
            continue;
        }

        let meta = node.meta.unwrap_or_default();
        if meta.deprecated && !include_obsolete {
            obsolete += 1;
            continue;
        }

        nodes.push(RawNode {
            parents: parents.get(&curie).cloned().unwrap_or_default(),
            id: Some(curie),
            label: node.lbl.unwrap_or_default(),
            synonyms: meta
                .synonyms
                .into_iter()
                .filter_map(|synonym| synonym.val)
                .collect(),
            definition: meta.definition.and_then(|definition| definition.val),
            subsets: meta.subsets.into_iter().collect(),
            xrefs: meta.xrefs.into_iter().filter_map(|xref| xref.val).collect(),
            taxa: meta
                .property_values
                .iter()
                .filter_map(|property| property.val.clone())
                .filter(|val| val.contains("NCBITaxon"))
                .collect(),
            updated_at: updated_at(&meta.property_values),
            unreadable: None,
            raw,
        });
    }

    debug!(
        "parsed {} MONDO nodes ({ignored} foreign, {obsolete} obsolete skipped)",
        nodes.len()
    );

    Ok(FetchedOntology {
        release_version: Some(release_version),
        nodes,
    })
}

fn unreadable(id: Option<String>, raw: Value, reason: String) -> RawNode {
    RawNode {
        id,
        unreadable: Some(reason),
        ..RawNode::new("").with_raw(raw)
    }
}

fn updated_at(property_values: &[PropertyValue]) -> Option<DateTime<Utc>> {
    DATE_PREDICATES.iter().find_map(|suffix| {
        property_values
            .iter()
            .filter(|property| {
                property
                    .pred
                    .as_deref()
                    .is_some_and(|pred| pred.ends_with(suffix))
            })
            .find_map(|property| property.val.as_deref().and_then(parse_timestamp))
    })
}

/// RFC 3339, or a bare date or date-time taken as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.with_timezone(&Utc));
    }
    if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(timestamp.and_utc());
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|timestamp| timestamp.and_utc())
}

/// `child -> parents` over `is_a` edges between MONDO terms.
fn parent_index(edges: &[Edge]) -> FnvHashMap<String, IndexSet<String>> {
    let mut index: FnvHashMap<String, IndexSet<String>> = Default::default();

    for edge in edges.iter().filter(|edge| edge.pred == IS_A) {
        if let (Some(child), Some(parent)) = (mondo_curie(&edge.sub), mondo_curie(&edge.obj)) {
            index.entry(child).or_default().insert(parent);
        }
    }

    index
}

fn release_version(meta: &GraphMeta) -> String {
    let version_info = || {
        meta.property_values
            .iter()
            .filter(|property| {
                property
                    .pred
                    .as_deref()
                    .is_some_and(|pred| pred.ends_with("versionInfo"))
            })
            .find_map(|property| property.val.clone())
    };

    [meta.version.clone(), meta.version_info.clone()]
        .into_iter()
        .flatten()
        .map(|version| version.trim().to_string())
        .find(|version| !version.is_empty())
        .or_else(version_info)
        .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
}

/// Reduce an IRI or CURIE to the `MONDO:nnnnnnn` form.
///
/// Accepts `MONDO:0005070`, `MONDO_0005070` and IRIs containing either.
pub fn mondo_curie(identifier: &str) -> Option<String> {
    for (index, _) in identifier.match_indices("MONDO") {
        let rest = &identifier[index + "MONDO".len()..];
        let Some(number) = rest.strip_prefix([':', '_']) else {
            continue;
        };
        let digits: String = number.chars().take_while(char::is_ascii_digit).collect();

        if !digits.is_empty() {
            return Some(format!("MONDO:{digits}"));
        }
    }

    None
}
