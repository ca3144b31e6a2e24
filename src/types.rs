use crate::schema::CanonicalField;
use crate::util::NOT_PROVIDED;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tabled::Tabled;

/// Intervention counts, one per numeric canonical field. Used both for a
/// single row and for the sums over a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Counts {
    pub fires: f64,
    pub residential_fires: f64,
    pub victim_rescue: f64,
    pub person_rescue: f64,
    pub malaise_urgent: f64,
    pub malaise_shortage: f64,
    pub road_accidents: f64,
    pub misc_operations: f64,
    pub total_interventions: f64,
}

impl Counts {
    /// Value of a numeric field; `None` for categorical fields.
    pub fn get(&self, field: CanonicalField) -> Option<f64> {
        let v = match field {
            CanonicalField::Fires => self.fires,
            CanonicalField::ResidentialFires => self.residential_fires,
            CanonicalField::VictimRescue => self.victim_rescue,
            CanonicalField::PersonRescue => self.person_rescue,
            CanonicalField::MalaiseUrgent => self.malaise_urgent,
            CanonicalField::MalaiseShortage => self.malaise_shortage,
            CanonicalField::RoadAccidents => self.road_accidents,
            CanonicalField::MiscOperations => self.misc_operations,
            CanonicalField::TotalInterventions => self.total_interventions,
            _ => return None,
        };
        Some(v)
    }

    pub fn set(&mut self, field: CanonicalField, value: f64) {
        let slot = match field {
            CanonicalField::Fires => &mut self.fires,
            CanonicalField::ResidentialFires => &mut self.residential_fires,
            CanonicalField::VictimRescue => &mut self.victim_rescue,
            CanonicalField::PersonRescue => &mut self.person_rescue,
            CanonicalField::MalaiseUrgent => &mut self.malaise_urgent,
            CanonicalField::MalaiseShortage => &mut self.malaise_shortage,
            CanonicalField::RoadAccidents => &mut self.road_accidents,
            CanonicalField::MiscOperations => &mut self.misc_operations,
            CanonicalField::TotalInterventions => &mut self.total_interventions,
            _ => return,
        };
        *slot = value;
    }

    pub fn add(&mut self, other: &Counts) {
        for field in CanonicalField::NUMERIC {
            let sum = self.get(field).unwrap_or(0.0) + other.get(field).unwrap_or(0.0);
            self.set(field, sum);
        }
    }

    /// Sum of the subcategories that are supposed to partition the total.
    pub fn exclusive_subtotal(&self) -> f64 {
        self.victim_rescue
            + self.person_rescue
            + self.fires
            + self.road_accidents
            + self.misc_operations
    }
}

/// Figures computed from [`Counts`]. Always recomputed from counts, so a
/// group's rate is a rate of sums and never a mean of rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Derived {
    pub total_malaise: f64,
    pub total_medical: f64,
    /// Shortage malaises over all home malaises, in percent.
    pub shortage_rate: f64,
    /// Medical interventions over all interventions, in percent. Not
    /// clamped: overlapping source categories can push it past 100.
    pub medical_share: f64,
}

impl Derived {
    pub fn from_counts(c: &Counts) -> Derived {
        let total_malaise = c.malaise_urgent + c.malaise_shortage;
        let total_medical = c.victim_rescue + c.person_rescue;
        Derived {
            total_malaise,
            total_medical,
            shortage_rate: crate::aggregate::percent_of(c.malaise_shortage, total_malaise),
            medical_share: crate::aggregate::percent_of(total_medical, c.total_interventions),
        }
    }
}

/// One territory row after normalization. Every attribute is populated.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRow {
    pub year: String,
    /// Zone label as written in the source.
    pub zone_label: String,
    pub region: String,
    pub department_number: String,
    pub department: String,
    /// Two-digit department code used as the map join key.
    pub department_code: String,
    /// Classified zone type (see `normalize::classify_zone`).
    pub zone: String,
    pub category: String,
    pub counts: Counts,
    /// Configured extra numeric columns, in schema order.
    pub extras: Vec<f64>,
    pub derived: Derived,
}

impl CanonicalRow {
    /// Row with every field at its default.
    pub fn empty(extra_count: usize) -> CanonicalRow {
        CanonicalRow {
            year: NOT_PROVIDED.to_string(),
            zone_label: NOT_PROVIDED.to_string(),
            region: NOT_PROVIDED.to_string(),
            department_number: NOT_PROVIDED.to_string(),
            department: NOT_PROVIDED.to_string(),
            department_code: "00".to_string(),
            zone: NOT_PROVIDED.to_string(),
            category: NOT_PROVIDED.to_string(),
            counts: Counts::default(),
            extras: vec![0.0; extra_count],
            derived: Derived::default(),
        }
    }

    pub fn text(&self, field: CanonicalField) -> Option<&str> {
        let s = match field {
            CanonicalField::Year => &self.year,
            CanonicalField::ZoneLabel => &self.zone_label,
            CanonicalField::Region => &self.region,
            CanonicalField::DepartmentNumber => &self.department_number,
            CanonicalField::Department => &self.department,
            CanonicalField::Category => &self.category,
            _ => return None,
        };
        Some(s.as_str())
    }

    pub fn set_text(&mut self, field: CanonicalField, value: String) {
        let slot = match field {
            CanonicalField::Year => &mut self.year,
            CanonicalField::ZoneLabel => &mut self.zone_label,
            CanonicalField::Region => &mut self.region,
            CanonicalField::DepartmentNumber => &mut self.department_number,
            CanonicalField::Department => &mut self.department,
            CanonicalField::Category => &mut self.category,
            _ => return,
        };
        *slot = value;
    }
}

/// Normalized rows of one source file. Immutable once built; filtering
/// borrows rows instead of copying them.
#[derive(Debug, Clone)]
pub struct CanonicalTable {
    rows: Arc<[CanonicalRow]>,
    extra_names: Arc<[String]>,
}

impl CanonicalTable {
    pub fn new(rows: Vec<CanonicalRow>, extra_names: Vec<String>) -> CanonicalTable {
        CanonicalTable {
            rows: rows.into(),
            extra_names: extra_names.into(),
        }
    }

    pub fn rows(&self) -> &[CanonicalRow] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CanonicalRow> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn extra_names(&self) -> &[String] {
        &self.extra_names
    }
}

impl<'a> IntoIterator for &'a CanonicalTable {
    type Item = &'a CanonicalRow;
    type IntoIter = std::slice::Iter<'a, CanonicalRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Rows retained by a filter, borrowed from the table.
pub type FilteredView<'a> = Vec<&'a CanonicalRow>;

/// Values the UI uses for "no constraint".
const ANY_TOKENS: [&str; 2] = ["Toutes", "Tous"];

/// Optional equality constraints on region, zone type and category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterPredicate {
    pub region: Option<String>,
    pub zone: Option<String>,
    pub category: Option<String>,
}

impl FilterPredicate {
    /// Build from UI selections, where "Toutes"/"Tous" means unconstrained.
    pub fn from_selection(region: Option<&str>, zone: Option<&str>, category: Option<&str>) -> Self {
        fn constraint(s: Option<&str>) -> Option<String> {
            let s = s?.trim();
            if s.is_empty() || ANY_TOKENS.contains(&s) {
                None
            } else {
                Some(s.to_string())
            }
        }
        FilterPredicate {
            region: constraint(region),
            zone: constraint(zone),
            category: constraint(category),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_none() && self.zone.is_none() && self.category.is_none()
    }

    pub fn matches(&self, row: &CanonicalRow) -> bool {
        fn eq(constraint: &Option<String>, value: &str) -> bool {
            constraint.as_deref().map_or(true, |c| c == value)
        }
        eq(&self.region, &row.region) && eq(&self.zone, &row.zone) && eq(&self.category, &row.category)
    }
}

impl fmt::Display for FilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Région: {} | Zone: {} | Catégorie: {}",
            self.region.as_deref().unwrap_or("Toutes"),
            self.zone.as_deref().unwrap_or("Toutes"),
            self.category.as_deref().unwrap_or("Toutes"),
        )
    }
}

/// Attribute a summary is partitioned by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Region,
    Department,
    /// Department code together with the department name. Rows sharing a
    /// fallback code such as `"00"` stay apart when their names differ.
    Territory,
    Zone,
    Category,
}

impl GroupKey {
    pub fn key_of(self, row: &CanonicalRow) -> &str {
        match self {
            GroupKey::Region => &row.region,
            GroupKey::Department => &row.department,
            GroupKey::Territory => &row.department_code,
            GroupKey::Zone => &row.zone,
            GroupKey::Category => &row.category,
        }
    }

    pub fn label_of(self, row: &CanonicalRow) -> &str {
        match self {
            GroupKey::Territory => &row.department,
            other => other.key_of(row),
        }
    }
}

/// Summed counts for a set of rows, with derived figures recomputed from
/// the sums.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub rows: usize,
    pub counts: Counts,
    pub extras: Vec<f64>,
    pub derived: Derived,
}

impl Totals {
    pub fn add_row(&mut self, row: &CanonicalRow) {
        self.rows += 1;
        self.counts.add(&row.counts);
        if self.extras.len() < row.extras.len() {
            self.extras.resize(row.extras.len(), 0.0);
        }
        for (acc, v) in self.extras.iter_mut().zip(&row.extras) {
            *acc += v;
        }
        self.derived = Derived::from_counts(&self.counts);
    }

    pub fn from_rows<'a, I>(rows: I) -> Totals
    where
        I: IntoIterator<Item = &'a CanonicalRow>,
    {
        let mut totals = Totals::default();
        for row in rows {
            totals.add_row(row);
        }
        totals
    }
}

/// A figure that can rank or colour territories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    TotalInterventions,
    Medical,
    Fires,
    ResidentialFires,
    RoadAccidents,
    ShortageEvents,
    ShortageRate,
    MedicalShare,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::TotalInterventions,
        Metric::Medical,
        Metric::Fires,
        Metric::ResidentialFires,
        Metric::RoadAccidents,
        Metric::ShortageEvents,
        Metric::ShortageRate,
        Metric::MedicalShare,
    ];

    pub fn value(self, t: &Totals) -> f64 {
        match self {
            Metric::TotalInterventions => t.counts.total_interventions,
            Metric::Medical => t.derived.total_medical,
            Metric::Fires => t.counts.fires,
            Metric::ResidentialFires => t.counts.residential_fires,
            Metric::RoadAccidents => t.counts.road_accidents,
            Metric::ShortageEvents => t.counts.malaise_shortage,
            Metric::ShortageRate => t.derived.shortage_rate,
            Metric::MedicalShare => t.derived.medical_share,
        }
    }

    pub fn is_rate(self) -> bool {
        matches!(self, Metric::ShortageRate | Metric::MedicalShare)
    }

    pub fn label(self) -> &'static str {
        match self {
            Metric::TotalInterventions => "Total interventions",
            Metric::Medical => "Urgences médicales",
            Metric::Fires => "Incendies",
            Metric::ResidentialFires => "Feux d'habitations",
            Metric::RoadAccidents => "Accidents de circulation",
            Metric::ShortageEvents => "Carences",
            Metric::ShortageRate => "Taux de carence (%)",
            Metric::MedicalShare => "Part urgences médicales (%)",
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            Metric::TotalInterventions => "total",
            Metric::Medical => "medical",
            Metric::Fires => "fires",
            Metric::ResidentialFires => "residential-fires",
            Metric::RoadAccidents => "road-accidents",
            Metric::ShortageEvents => "shortages",
            Metric::ShortageRate => "shortage-rate",
            Metric::MedicalShare => "medical-share",
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Metric::ALL
            .into_iter()
            .find(|m| m.keyword() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Metric::ALL.iter().map(|m| m.keyword()).collect();
                format!("unknown metric '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Dashboard page currently displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationState {
    Context,
    Overview,
    Medical,
    Fires,
    Geographic { metric: Metric, top_n: usize },
    Quality,
}

impl NavigationState {
    pub fn title(&self) -> &'static str {
        match self {
            NavigationState::Context => "Contexte",
            NavigationState::Overview => "Vue d'ensemble",
            NavigationState::Medical => "Urgences médicales",
            NavigationState::Fires => "Incendies",
            NavigationState::Geographic { .. } => "Analyse géographique",
            NavigationState::Quality => "Qualité des données",
        }
    }
}

/// Page keyword as accepted on the command line. Geographic settings are
/// given separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Context,
    Overview,
    Medical,
    Fires,
    Geographic,
    Quality,
}

impl Page {
    pub fn into_state(self, metric: Metric, top_n: usize) -> NavigationState {
        match self {
            Page::Context => NavigationState::Context,
            Page::Overview => NavigationState::Overview,
            Page::Medical => NavigationState::Medical,
            Page::Fires => NavigationState::Fires,
            Page::Geographic => NavigationState::Geographic { metric, top_n },
            Page::Quality => NavigationState::Quality,
        }
    }
}

impl FromStr for Page {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "context" => Ok(Page::Context),
            "overview" => Ok(Page::Overview),
            "medical" => Ok(Page::Medical),
            "fires" => Ok(Page::Fires),
            "geographic" | "map" => Ok(Page::Geographic),
            "quality" => Ok(Page::Quality),
            other => Err(format!(
                "unknown page '{}' (expected context, overview, medical, fires, geographic or quality)",
                other
            )),
        }
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct KpiRow {
    #[serde(rename = "Indicateur")]
    #[tabled(rename = "Indicateur")]
    pub indicator: String,
    #[serde(rename = "Valeur")]
    #[tabled(rename = "Valeur")]
    pub value: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ShareRow {
    #[serde(rename = "Categorie")]
    #[tabled(rename = "Categorie")]
    pub category: String,
    #[serde(rename = "Nombre")]
    #[tabled(rename = "Nombre")]
    pub count: String,
    #[serde(rename = "Part")]
    #[tabled(rename = "Part")]
    pub share: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct DepartmentRankingRow {
    #[serde(rename = "Rang")]
    #[tabled(rename = "Rang")]
    pub rank: usize,
    #[serde(rename = "Departement")]
    #[tabled(rename = "Departement")]
    pub department: String,
    #[serde(rename = "Interventions")]
    #[tabled(rename = "Interventions")]
    pub total: String,
    #[serde(rename = "UrgencesMedicales")]
    #[tabled(rename = "UrgencesMedicales")]
    pub medical: String,
    #[serde(rename = "Incendies")]
    #[tabled(rename = "Incendies")]
    pub fires: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct RegionShortageRow {
    #[serde(rename = "Rang")]
    #[tabled(rename = "Rang")]
    pub rank: usize,
    #[serde(rename = "Region")]
    #[tabled(rename = "Region")]
    pub region: String,
    #[serde(rename = "Carences")]
    #[tabled(rename = "Carences")]
    pub shortages: String,
    #[serde(rename = "TotalMalaises")]
    #[tabled(rename = "TotalMalaises")]
    pub total_malaise: String,
    #[serde(rename = "TauxCarence")]
    #[tabled(rename = "TauxCarence")]
    pub shortage_rate: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct FireRankingRow {
    #[serde(rename = "Rang")]
    #[tabled(rename = "Rang")]
    pub rank: usize,
    #[serde(rename = "Departement")]
    #[tabled(rename = "Departement")]
    pub department: String,
    #[serde(rename = "Incendies")]
    #[tabled(rename = "Incendies")]
    pub fires: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ZoneFireRow {
    #[serde(rename = "Zone")]
    #[tabled(rename = "Zone")]
    pub zone: String,
    #[serde(rename = "Incendies")]
    #[tabled(rename = "Incendies")]
    pub fires: String,
    #[serde(rename = "FeuxHabitations")]
    #[tabled(rename = "FeuxHabitations")]
    pub residential_fires: String,
    #[serde(rename = "Interventions")]
    #[tabled(rename = "Interventions")]
    pub total: String,
    #[serde(rename = "PartIncendies")]
    #[tabled(rename = "PartIncendies")]
    pub fire_share: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct TerritoryRow {
    #[serde(rename = "Rang")]
    #[tabled(rename = "Rang")]
    pub rank: usize,
    #[serde(rename = "Code")]
    #[tabled(rename = "Code")]
    pub code: String,
    #[serde(rename = "Departement")]
    #[tabled(rename = "Departement")]
    pub department: String,
    #[serde(rename = "Interventions")]
    #[tabled(rename = "Interventions")]
    pub total: String,
    #[serde(rename = "UrgencesMedicales")]
    #[tabled(rename = "UrgencesMedicales")]
    pub medical: String,
    #[serde(rename = "Incendies")]
    #[tabled(rename = "Incendies")]
    pub fires: String,
    #[serde(rename = "PartMedical")]
    #[tabled(rename = "PartMedical")]
    pub medical_share: String,
    #[serde(rename = "Metrique")]
    #[tabled(rename = "Metrique")]
    pub metric: String,
}

/// Map-ready value for one department code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerritoryMetric {
    pub code: String,
    pub department: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricStats {
    pub mean: f64,
    pub median: f64,
    pub max: f64,
    pub min: f64,
}

/// Totals written to `summary.json`.
#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub source: String,
    pub encoding: String,
    pub filters: FilterPredicate,
    pub rows: usize,
    pub departments: usize,
    pub total_interventions: f64,
    pub total_medical: f64,
    pub medical_share: f64,
    pub shortage_rate: f64,
    pub quality: crate::normalize::QualityReport,
}
