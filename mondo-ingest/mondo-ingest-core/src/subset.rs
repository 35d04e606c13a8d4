use serde::{Deserialize, Serialize};

use crate::record::OntologyType;

/// Which subset tags mark a term as neoplastic or rare.
///
/// Subset tags are compared by their local name (see [local_name]), case-insensitively.
/// Oncology markers take priority over rarity markers, since a term may carry both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubsetPolicy {
    pub oncology_markers: Vec<String>,
    pub rarity_markers: Vec<String>,
}

impl Default for SubsetPolicy {
    fn default() -> Self {
        Self {
            oncology_markers: ["neoplasm", "neoplastic", "cancer", "oncology"]
                .map(String::from)
                .to_vec(),
            rarity_markers: [
                "rare",
                "gard_rare",
                "nord_rare",
                "orphanet_rare",
                "mondo_rare",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

impl SubsetPolicy {
    pub fn classify<'a>(&self, subsets: impl IntoIterator<Item = &'a str>) -> OntologyType {
        let local_names: Vec<String> = subsets
            .into_iter()
            .map(local_name)
            .filter(|name| !name.is_empty())
            .map(str::to_lowercase)
            .collect();

        let contains_any = |markers: &[String]| {
            markers
                .iter()
                .any(|marker| local_names.contains(&marker.to_lowercase()))
        };

        if contains_any(&self.oncology_markers) {
            OntologyType::Neoplastic
        } else if contains_any(&self.rarity_markers) {
            OntologyType::Rare
        } else {
            match local_names.into_iter().min() {
                Some(first) => OntologyType::Subset(first),
                None => OntologyType::Unclassified,
            }
        }
    }
}

/// `http://purl.obolibrary.org/obo/mondo#rare` => `rare`
pub fn local_name(subset: &str) -> &str {
    let subset = subset.trim();
    match subset.rfind(['#', '/']) {
        Some(pos) => &subset[pos + 1..],
        None => subset,
    }
}
