//! Canonical schema and header resolution.
//!
//! Source exports spell their headers in many ways ("Région", "REGION ",
//! "Nom région"...). Each canonical field carries a ranked list of known
//! spellings; a raw header is matched against it in three stages:
//!
//! 1. exact match (surrounding whitespace ignored),
//! 2. case- and accent-insensitive match,
//! 3. containment of one folded string in the other.
//!
//! The first stage that yields a match wins.

use crate::util::fold;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Minimum folded length for the containment stage. Shorter strings match
/// far too much.
const MIN_CONTAINMENT_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CanonicalField {
    Year,
    ZoneLabel,
    Region,
    DepartmentNumber,
    Department,
    Category,
    Fires,
    ResidentialFires,
    VictimRescue,
    PersonRescue,
    MalaiseUrgent,
    MalaiseShortage,
    RoadAccidents,
    MiscOperations,
    TotalInterventions,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 15] = [
        CanonicalField::Year,
        CanonicalField::ZoneLabel,
        CanonicalField::Region,
        CanonicalField::DepartmentNumber,
        CanonicalField::Department,
        CanonicalField::Category,
        CanonicalField::Fires,
        CanonicalField::ResidentialFires,
        CanonicalField::VictimRescue,
        CanonicalField::PersonRescue,
        CanonicalField::MalaiseUrgent,
        CanonicalField::MalaiseShortage,
        CanonicalField::RoadAccidents,
        CanonicalField::MiscOperations,
        CanonicalField::TotalInterventions,
    ];

    pub const NUMERIC: [CanonicalField; 9] = [
        CanonicalField::Fires,
        CanonicalField::ResidentialFires,
        CanonicalField::VictimRescue,
        CanonicalField::PersonRescue,
        CanonicalField::MalaiseUrgent,
        CanonicalField::MalaiseShortage,
        CanonicalField::RoadAccidents,
        CanonicalField::MiscOperations,
        CanonicalField::TotalInterventions,
    ];

    /// Name of the field in exported tables.
    pub fn name(self) -> &'static str {
        match self {
            CanonicalField::Year => "Annee",
            CanonicalField::ZoneLabel => "Zone",
            CanonicalField::Region => "Region",
            CanonicalField::DepartmentNumber => "Numero",
            CanonicalField::Department => "Departement",
            CanonicalField::Category => "Categorie_A",
            CanonicalField::Fires => "Incendies",
            CanonicalField::ResidentialFires => "Feux_habitations",
            CanonicalField::VictimRescue => "Secours_victime",
            CanonicalField::PersonRescue => "Secours_personne",
            CanonicalField::MalaiseUrgent => "Malaises_Urgence",
            CanonicalField::MalaiseShortage => "Malaises_Carence",
            CanonicalField::RoadAccidents => "Accidents_circulation",
            CanonicalField::MiscOperations => "Operations_diverses",
            CanonicalField::TotalInterventions => "Total_interventions",
        }
    }

    pub fn from_name(name: &str) -> Option<CanonicalField> {
        let folded = fold(name);
        CanonicalField::ALL
            .into_iter()
            .find(|f| fold(f.name()) == folded)
    }

    pub fn is_numeric(self) -> bool {
        CanonicalField::NUMERIC.contains(&self)
    }

    /// Known spellings, most specific first.
    pub fn default_synonyms(self) -> &'static [&'static str] {
        match self {
            CanonicalField::Year => &["Année", "Annee", "Year"],
            CanonicalField::ZoneLabel => &["Zone", "Zone géographique", "Type de zone"],
            CanonicalField::Region => &["Région", "Region", "Nom région"],
            CanonicalField::DepartmentNumber => &[
                "Numéro",
                "Numero",
                "N° département",
                "Code département",
                "Code_Dept",
            ],
            CanonicalField::Department => &["Département", "Departement", "Nom département"],
            CanonicalField::Category => &["Catégorie A", "Categorie_A", "Catégorie", "Categorie"],
            CanonicalField::Fires => &["Incendies", "Total incendies", "Feux"],
            CanonicalField::ResidentialFires => &[
                "Feux d'habitations-bureaux",
                "Feux_habitations",
                "Feux d'habitations",
            ],
            CanonicalField::VictimRescue => &["Secours à victime", "Secours_victime"],
            CanonicalField::PersonRescue => &[
                "Secours à personne",
                "Secours_personne",
                "Aide à personne",
            ],
            CanonicalField::MalaiseUrgent => &[
                "Malaises à domicile : urgence vitale",
                "Malaises_Urgence",
                "Urgence vitale",
            ],
            CanonicalField::MalaiseShortage => &[
                "Malaises à domicile : carence",
                "Malaises_Carence",
                "Carence",
            ],
            CanonicalField::RoadAccidents => &[
                "Accidents de circulation",
                "Accidents_circulation",
                "Accidents de la route",
            ],
            CanonicalField::MiscOperations => &["Opérations diverses", "Operations_diverses"],
            CanonicalField::TotalInterventions => &[
                "Total interventions",
                "Total_interventions",
                "Total des interventions",
            ],
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A numeric column beyond the built-in set, declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraField {
    pub name: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl ExtraField {
    fn candidates(&self) -> Vec<String> {
        let mut out = self.synonyms.clone();
        out.push(self.name.clone());
        out
    }
}

/// The set of canonical fields a pipeline run resolves, with their ranked
/// candidate spellings.
#[derive(Debug, Clone)]
pub struct Schema {
    candidates: HashMap<CanonicalField, Vec<String>>,
    extras: Vec<ExtraField>,
}

impl Default for Schema {
    fn default() -> Self {
        let candidates = CanonicalField::ALL
            .into_iter()
            .map(|f| {
                let list = f.default_synonyms().iter().map(|s| s.to_string()).collect();
                (f, list)
            })
            .collect();
        Schema {
            candidates,
            extras: Vec::new(),
        }
    }
}

impl Schema {
    /// Add spellings for a field. They rank ahead of the built-in ones.
    pub fn with_synonyms<I, S>(mut self, field: CanonicalField, spellings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = self.candidates.entry(field).or_default();
        let mut added: Vec<String> = spellings.into_iter().map(Into::into).collect();
        added.append(list);
        *list = added;
        self
    }

    pub fn with_extra(mut self, extra: ExtraField) -> Self {
        self.extras.push(extra);
        self
    }

    pub fn candidates(&self, field: CanonicalField) -> &[String] {
        self.candidates.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn extras(&self) -> &[ExtraField] {
        &self.extras
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Exact,
    Folded,
    Contains,
}

const STAGES: [Stage; 3] = [Stage::Exact, Stage::Folded, Stage::Contains];

fn matches_at(stage: Stage, candidate: &str, header: &str) -> bool {
    match stage {
        Stage::Exact => header.trim() == candidate.trim(),
        Stage::Folded => fold(header) == fold(candidate),
        Stage::Contains => {
            let (h, c) = (fold(header), fold(candidate));
            if h.chars().count() < MIN_CONTAINMENT_LEN || c.chars().count() < MIN_CONTAINMENT_LEN {
                return false;
            }
            h.contains(&c) || c.contains(&h)
        }
    }
}

fn find_at<C, H>(stage: Stage, candidates: &[C], headers: &[H], claimed: &[bool]) -> Option<usize>
where
    C: AsRef<str>,
    H: AsRef<str>,
{
    candidates.iter().find_map(|candidate| {
        headers.iter().enumerate().position(|(idx, header)| {
            !claimed.get(idx).copied().unwrap_or(false)
                && matches_at(stage, candidate.as_ref(), header.as_ref())
        })
    })
}

/// Resolve one canonical field against a raw header row.
///
/// Returns the index of the first header matched by the earliest stage, or
/// `None` when the field is absent from the source.
pub fn resolve_header<C, H>(candidates: &[C], raw_headers: &[H]) -> Option<usize>
where
    C: AsRef<str>,
    H: AsRef<str>,
{
    STAGES
        .into_iter()
        .find_map(|stage| find_at(stage, candidates, raw_headers, &[]))
}

/// Column index of every canonical field found in a source.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    columns: HashMap<CanonicalField, usize>,
    extras: Vec<Option<usize>>,
}

impl HeaderMap {
    /// Resolve the whole schema at once.
    ///
    /// Every field is tried at a stage before any field moves on to the
    /// next one, and a header taken by one field is not offered to another.
    /// This keeps a loose candidate like "Feux" from taking the
    /// residential-fires column.
    pub fn resolve<H: AsRef<str>>(schema: &Schema, headers: &[H]) -> HeaderMap {
        let mut claimed = vec![false; headers.len()];
        let mut columns = HashMap::new();
        let mut extras: Vec<Option<usize>> = vec![None; schema.extras.len()];
        let extra_candidates: Vec<Vec<String>> =
            schema.extras.iter().map(ExtraField::candidates).collect();

        for stage in STAGES {
            for field in CanonicalField::ALL {
                if columns.contains_key(&field) {
                    continue;
                }
                if let Some(idx) = find_at(stage, schema.candidates(field), headers, &claimed) {
                    claimed[idx] = true;
                    columns.insert(field, idx);
                }
            }
            for (slot, candidates) in extras.iter_mut().zip(&extra_candidates) {
                if slot.is_some() {
                    continue;
                }
                if let Some(idx) = find_at(stage, candidates, headers, &claimed) {
                    claimed[idx] = true;
                    *slot = Some(idx);
                }
            }
        }

        HeaderMap { columns, extras }
    }

    pub fn column(&self, field: CanonicalField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn extra_column(&self, idx: usize) -> Option<usize> {
        self.extras.get(idx).copied().flatten()
    }

    /// Canonical fields with no matching header, in schema order.
    pub fn missing(&self) -> Vec<CanonicalField> {
        CanonicalField::ALL
            .into_iter()
            .filter(|f| !self.columns.contains_key(f))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_spellings_resolve_to_the_same_field() {
        let candidates = CanonicalField::Region.default_synonyms();
        assert_eq!(resolve_header(candidates, &["Année", "Région"]), Some(1));
        assert_eq!(resolve_header(candidates, &["REGION ", "Zone"]), Some(0));
        assert_eq!(resolve_header(candidates, &["Nom de la région"]), Some(0));
        assert_eq!(resolve_header(candidates, &["Zone", "Total"]), None);
    }

    #[test]
    fn exact_match_beats_looser_stages() {
        let candidates = ["Incendies"];
        let headers = ["Total incendies", "Incendies"];
        assert_eq!(resolve_header(&candidates, &headers), Some(1));
    }

    #[test]
    fn short_strings_never_match_by_containment() {
        let candidates = ["Region"];
        assert_eq!(resolve_header(&candidates, &["Re"]), None);
        assert_eq!(resolve_header(&candidates, &[""]), None);
    }

    #[test]
    fn header_map_does_not_reuse_claimed_headers() {
        let schema = Schema::default();
        let headers = ["Département", "Feux d'habitations-bureaux", "Total interventions"];
        let map = HeaderMap::resolve(&schema, &headers);
        assert_eq!(map.column(CanonicalField::ResidentialFires), Some(1));
        assert_eq!(map.column(CanonicalField::Fires), None);
        assert_eq!(map.column(CanonicalField::Department), Some(0));
        assert_eq!(map.column(CanonicalField::TotalInterventions), Some(2));
        assert!(map.missing().contains(&CanonicalField::Region));
    }

    #[test]
    fn configured_synonyms_rank_first() {
        let schema = Schema::default().with_synonyms(CanonicalField::Region, ["Territoire"]);
        assert_eq!(schema.candidates(CanonicalField::Region)[0], "Territoire");
        let map = HeaderMap::resolve(&schema, &["Territoire"]);
        assert_eq!(map.column(CanonicalField::Region), Some(0));
    }

    #[test]
    fn extra_fields_resolve_like_builtins() {
        let schema = Schema::default().with_extra(ExtraField {
            name: "Risques_technologiques".to_string(),
            synonyms: vec!["Risques technologiques".to_string()],
        });
        let map = HeaderMap::resolve(&schema, &["Région", "RISQUES TECHNOLOGIQUES"]);
        assert_eq!(map.extra_column(0), Some(1));
        assert_eq!(map.extra_column(1), None);
    }

    #[test]
    fn field_names_round_trip() {
        for field in CanonicalField::ALL {
            assert_eq!(CanonicalField::from_name(field.name()), Some(field));
        }
        assert_eq!(CanonicalField::from_name("nope"), None);
    }
}
