//! Flattening of raw ontology nodes into deduplicated records.
//!
//! Every node is merged into its id group in one flat pass. Parent links are only
//! looked up, never followed, so cyclic input cannot cause non-termination.

use chrono::{DateTime, Utc};
use fnv::{FnvBuildHasher, FnvHashSet};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    human::non_human,
    raw_node::RawNode,
    record::NormalizedRecord,
    report::RecordIssue,
    subset::SubsetPolicy,
};

type FnvIndexMap<K, V> = IndexMap<K, V, FnvBuildHasher>;

/// Output of [normalize].
#[derive(Clone, Debug, Default)]
pub struct Normalized {
    pub records: Vec<NormalizedRecord>,
    pub stats: NormalizeStats,
    /// Skipped nodes, with reasons.
    pub issues: Vec<RecordIssue>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeStats {
    /// Raw nodes received.
    pub input: usize,
    /// Raw nodes folded into an earlier node with the same id.
    pub merged_duplicates: usize,
    /// Nodes or groups skipped as unusable.
    pub malformed: usize,
    /// Records listed in [NormalizeOptions::exclude_ids].
    #[serde(default)]
    pub excluded: usize,
    /// Records dropped as veterinary terms.
    #[serde(default)]
    pub non_human: usize,
    /// Records unchanged since [NormalizeOptions::updated_since].
    #[serde(default)]
    pub not_updated: usize,
    /// Records dropped by the oncology filter.
    pub filtered_out: usize,
    /// Records referencing at least one parent outside the batch.
    pub unresolved_parent_records: usize,
    /// Total parent references outside the batch.
    pub unresolved_parent_refs: usize,
    /// Records listing themselves as a parent.
    pub self_references: usize,
    /// Records emitted.
    pub output: usize,
}

/// Which records to leave out of the output.
///
/// Filtered records still resolve as parents of the records that are kept.
#[derive(Clone, Debug, Default)]
pub struct NormalizeOptions {
    pub filter_oncology_only: bool,
    /// Drop terms classified as non-human, see [crate::human].
    pub human_only: bool,
    /// Ids to drop, in `MONDO:n` or `MONDO_n` form.
    pub exclude_ids: Vec<String>,
    /// Drop terms last changed before this instant. Terms without a date are kept.
    pub updated_since: Option<DateTime<Utc>>,
    pub subsets: SubsetPolicy,
}

/// Case-folded, trimmed form used to group ids and compare synonyms.
pub fn normalize_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// The stored form of an id: trimmed and upper-cased.
///
/// Independent of which casing a source happened to deliver first, so that
/// re-ingesting a term always hits the same row.
pub fn canonical_id(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Grouping key of an excluded id. Accepts the underscore form of IRIs.
fn exclusion_key(value: &str) -> String {
    normalize_key(&value.trim().replacen('_', ":", 1))
}

/// Accumulated state of all raw nodes sharing one id key.
struct Group {
    mondo_id: String,
    label: String,
    /// key => first seen casing
    synonyms: FnvIndexMap<String, String>,
    parents: Vec<String>,
    definition: String,
    subsets: IndexSet<String>,
    xrefs: IndexSet<String>,
    taxa: IndexSet<String>,
    updated_at: Option<DateTime<Utc>>,
    raw: serde_json::Value,
}

impl Group {
    fn new(id: &str, raw: serde_json::Value) -> Self {
        Self {
            mondo_id: canonical_id(id),
            label: String::new(),
            synonyms: Default::default(),
            parents: vec![],
            definition: String::new(),
            subsets: IndexSet::new(),
            xrefs: IndexSet::new(),
            taxa: IndexSet::new(),
            updated_at: None,
            raw,
        }
    }

    fn absorb(&mut self, node: RawNode) {
        let label = node.label.trim();
        if label.chars().count() > self.label.chars().count() {
            self.label = label.to_string();
        }

        for synonym in &node.synonyms {
            let synonym = synonym.trim();
            if synonym.is_empty() {
                continue;
            }
            self.synonyms
                .entry(normalize_key(synonym))
                .or_insert_with(|| synonym.to_string());
        }

        self.parents.extend(node.parents);

        if self.definition.is_empty() {
            if let Some(definition) = node.definition.as_deref().map(str::trim) {
                self.definition = definition.to_string();
            }
        }

        self.subsets.extend(node.subsets);
        self.xrefs.extend(node.xrefs);
        self.taxa.extend(node.taxa);
        self.updated_at = self.updated_at.max(node.updated_at);
    }
}

/// Normalize a batch of raw nodes, keeping everything but malformed and
/// (with `filter_oncology_only`) non-neoplastic terms.
pub fn normalize(
    raw_nodes: impl IntoIterator<Item = RawNode>,
    filter_oncology_only: bool,
    policy: &SubsetPolicy,
) -> Normalized {
    normalize_with(
        raw_nodes,
        &NormalizeOptions {
            filter_oncology_only,
            subsets: policy.clone(),
            ..Default::default()
        },
    )
}

/// Normalize a batch of raw nodes.
///
/// Deterministic for a given input order: output follows the first appearance of each id.
/// Filters apply in the order exclusion, species, update date, oncology; a record is counted
/// by the first filter that drops it.
pub fn normalize_with(
    raw_nodes: impl IntoIterator<Item = RawNode>,
    options: &NormalizeOptions,
) -> Normalized {
    let mut stats = NormalizeStats::default();
    let mut issues = vec![];
    let mut groups: FnvIndexMap<String, Group> = Default::default();
    let excluded_keys: FnvHashSet<String> = options
        .exclude_ids
        .iter()
        .map(|id| exclusion_key(id))
        .collect();

    for (position, mut node) in raw_nodes.into_iter().enumerate() {
        stats.input += 1;

        if let Some(reason) = node.unreadable.take() {
            stats.malformed += 1;
            issues.push(RecordIssue::new(node.id().map(canonical_id), reason));
            continue;
        }

        let Some(id) = node.id().map(str::to_string) else {
            stats.malformed += 1;
            issues.push(RecordIssue::new(
                node.id.clone(),
                format!("node #{position} has no id"),
            ));
            continue;
        };

        let key = normalize_key(&id);
        match groups.get_mut(&key) {
            Some(group) => {
                debug!("merging duplicate `{id}` into `{}`", group.mondo_id);
                stats.merged_duplicates += 1;
                group.absorb(node);
            }
            None => {
                let mut group = Group::new(&id, node.raw.take());
                group.absorb(node);
                groups.insert(key, group);
            }
        }
    }

    let mut records = Vec::with_capacity(groups.len());

    for (key, group) in &groups {
        let disease_name = if group.label.is_empty() {
            group.synonyms.values().next().cloned().unwrap_or_default()
        } else {
            group.label.clone()
        };

        if disease_name.is_empty() {
            stats.malformed += 1;
            issues.push(RecordIssue::new(
                Some(group.mondo_id.clone()),
                "no label or synonym to name the record",
            ));
            continue;
        }

        let mut parent_keys = IndexSet::<String>::new();
        let mut parent_ids = IndexSet::new();
        let mut unresolved_parents = vec![];
        let mut self_reference = false;

        for parent in &group.parents {
            let parent = parent.trim();
            if parent.is_empty() {
                continue;
            }

            let parent_key = normalize_key(parent);
            if !parent_keys.insert(parent_key.clone()) {
                continue;
            }

            if &parent_key == key {
                self_reference = true;
            }

            match groups.get(&parent_key) {
                Some(parent_group) => {
                    parent_ids.insert(parent_group.mondo_id.clone());
                }
                None => {
                    let parent = canonical_id(parent);
                    parent_ids.insert(parent.clone());
                    unresolved_parents.push(parent);
                }
            }
        }

        if excluded_keys.contains(key) {
            debug!("`{}` excluded by configuration", group.mondo_id);
            stats.excluded += 1;
            continue;
        }

        if options.human_only {
            let species = non_human(
                &disease_name,
                group.taxa.iter().map(String::as_str),
                group.xrefs.iter().map(String::as_str),
            );
            if let Some(reason) = species {
                debug!("`{}` is not a human disease: {reason}", group.mondo_id);
                stats.non_human += 1;
                continue;
            }
        }

        if let (Some(since), Some(updated_at)) = (options.updated_since, group.updated_at) {
            if updated_at < since {
                stats.not_updated += 1;
                continue;
            }
        }

        let ontology_type = options
            .subsets
            .classify(group.subsets.iter().map(String::as_str));

        if options.filter_oncology_only && !ontology_type.is_oncology_relevant() {
            stats.filtered_out += 1;
            continue;
        }

        if !unresolved_parents.is_empty() {
            stats.unresolved_parent_records += 1;
            stats.unresolved_parent_refs += unresolved_parents.len();
        }
        if self_reference {
            stats.self_references += 1;
        }

        records.push(NormalizedRecord {
            mondo_id: group.mondo_id.clone(),
            disease_name,
            synonyms: group.synonyms.values().cloned().collect(),
            parent_ids,
            definition: group.definition.clone(),
            ontology_type,
            source_json: group.raw.clone(),
            unresolved_parents,
            self_reference,
        });
    }

    stats.output = records.len();

    Normalized {
        records,
        stats,
        issues,
    }
}
