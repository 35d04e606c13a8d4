//! Tells human diseases apart from veterinary ones.

use std::fmt::Display;

const HUMAN_TAXON: u32 = 9606;

const NON_HUMAN_MARKERS: [&str; 2] = ["non-human", "nonhuman"];

const ANIMAL_TERMS: [&str; 15] = [
    "veterinary",
    "plant disease",
    "animal disease",
    "livestock",
    "cattle",
    "swine",
    "poultry",
    "bovine",
    "canine",
    "feline",
    "equine",
    "porcine",
    "avian",
    "ovine",
    "caprine",
];

/// Why a term was judged not to describe a human disease.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NonHuman {
    /// The label says so explicitly, or names an animal group.
    Label(&'static str),
    /// Restricted to an NCBI taxon other than Homo sapiens.
    Taxon(u32),
    /// Cross-referenced to Online Mendelian Inheritance in Animals.
    OmiaXref(String),
}

impl Display for NonHuman {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Label(term) => write!(f, "label mentions `{term}`"),
            Self::Taxon(taxon) => write!(f, "restricted to NCBITaxon:{taxon}"),
            Self::OmiaXref(xref) => write!(f, "animal cross-reference {xref}"),
        }
    }
}

/// Classify a term by its label, taxon restrictions and cross-references.
///
/// Returns `None` for human terms. Absence of evidence counts as human.
pub fn non_human<'a>(
    label: &str,
    taxa: impl IntoIterator<Item = &'a str>,
    xrefs: impl IntoIterator<Item = &'a str>,
) -> Option<NonHuman> {
    let label = label.to_lowercase();

    if let Some(term) = NON_HUMAN_MARKERS
        .iter()
        .chain(ANIMAL_TERMS.iter())
        .copied()
        .find(|term| label.contains(term))
    {
        return Some(NonHuman::Label(term));
    }

    if let Some(taxon) = taxa
        .into_iter()
        .filter_map(ncbi_taxon)
        .find(|taxon| *taxon != HUMAN_TAXON)
    {
        return Some(NonHuman::Taxon(taxon));
    }

    xrefs
        .into_iter()
        .map(str::trim)
        .find(|xref| xref.starts_with("OMIA:"))
        .map(|xref| NonHuman::OmiaXref(xref.to_string()))
}

/// The number of an `NCBITaxon:nnnn` CURIE or `.../NCBITaxon_nnnn` IRI.
pub fn ncbi_taxon(value: &str) -> Option<u32> {
    let (_, rest) = value.split_once("NCBITaxon")?;
    let digits = rest.strip_prefix([':', '_'])?;
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());

    digits[..end].parse().ok()
}
