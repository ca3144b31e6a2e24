// Turns a raw source table into canonical rows.
//
// Nothing in here fails. Missing columns, blank cells and unreadable
// numbers fall back to defaults and are counted in the `QualityReport`
// so the degradation stays inspectable.
use crate::loader::RawTable;
use crate::schema::{CanonicalField, HeaderMap, Schema};
use crate::types::{CanonicalRow, CanonicalTable, Derived};
use crate::util::{clean_label, coerce_number, fold, Coerced};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

pub const ZONE_PARIS: &str = "Brigade de Paris (BSPP)";
pub const ZONE_MARSEILLE: &str = "Bataillon de Marseille (BMPM)";
pub const ZONE_OVERSEAS: &str = "Outre-mer";
pub const ZONE_MAINLAND: &str = "Métropole";

// Folded zone labels that denote an overseas territory.
static OVERSEAS_LABELS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "guadeloupe",
        "martinique",
        "guyane",
        "la reunion",
        "reunion",
        "mayotte",
        "antilles",
        "antilles-guyane",
        "ocean indien",
        "outre-mer",
        "outre mer",
        "dom",
        "dom-tom",
        "drom",
        "com",
        "saint-pierre-et-miquelon",
        "saint-martin",
        "saint-barthelemy",
        "polynesie francaise",
        "nouvelle-caledonie",
        "wallis-et-futuna",
    ]
    .into_iter()
    .collect()
});

/// Zone type of the two military fire services, which report under their
/// own identifier instead of a department number.
pub fn special_service(identifier: &str) -> Option<&'static str> {
    match identifier.trim().to_uppercase().as_str() {
        "BSPP" => Some(ZONE_PARIS),
        "BMPM" => Some(ZONE_MARSEILLE),
        _ => None,
    }
}

/// Classify a row's zone type from its service identifier and the zone
/// label written in the source.
pub fn classify_zone(identifier: &str, zone_label: &str) -> &'static str {
    if let Some(zone) = special_service(identifier) {
        return zone;
    }
    if OVERSEAS_LABELS.contains(fold(zone_label).as_str()) {
        ZONE_OVERSEAS
    } else {
        ZONE_MAINLAND
    }
}

/// Two-digit department code for joining with boundary data keyed the same
/// way ("01", "2A", "75", "971").
pub fn department_code(number: &str, department: &str) -> String {
    let n = number.trim();
    if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) {
        return format!("{:0>2}", n);
    }
    let upper = n.to_uppercase();
    if upper == "2A" || upper == "2B" {
        return upper;
    }
    // Numbers exported as floats ("1.0").
    if let Ok(v) = n.replace(',', ".").parse::<f64>() {
        if v >= 0.0 && v.fract() == 0.0 && v < 1000.0 {
            return format!("{:02}", v as u32);
        }
    }
    first_digit_run(n)
        .or_else(|| first_digit_run(department))
        .map(|digits| format!("{:0>2}", digits))
        .unwrap_or_else(|| "00".to_string())
}

fn first_digit_run(s: &str) -> Option<&str> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let rest = &s[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapKind {
    /// Victim + person rescue + fires + road + misc is above the total.
    SubcategoriesExceedTotal,
    /// Residential fires above all fires.
    ResidentialExceedsFires,
}

/// A row whose subcategories cannot all be exclusive. Shares computed from
/// it can pass 100%.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlapFlag {
    pub row: usize,
    pub department: String,
    pub category: String,
    pub kind: OverlapKind,
    pub subtotal: f64,
    pub total: f64,
}

/// What the normalizer had to paper over.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualityReport {
    pub rows: usize,
    /// Canonical fields with no matching header.
    pub missing_fields: Vec<String>,
    /// Cells that fell back to their default, per canonical field.
    pub defaulted_cells: BTreeMap<String, usize>,
    /// Numeric cells holding text that is not a number.
    pub unparseable_cells: usize,
    /// Numeric cells that parsed to a negative or infinite value.
    pub out_of_range_cells: usize,
    pub duplicate_rows: usize,
    pub overlaps: Vec<OverlapFlag>,
}

impl QualityReport {
    pub fn defaulted_total(&self) -> usize {
        self.defaulted_cells.values().sum()
    }

    pub fn has_overlaps(&self) -> bool {
        !self.overlaps.is_empty()
    }

    fn note_default(&mut self, field: &str) {
        *self.defaulted_cells.entry(field.to_string()).or_insert(0) += 1;
    }
}

/// Normalize every raw row against the schema.
pub fn normalize(raw: &RawTable, schema: &Schema) -> (CanonicalTable, QualityReport) {
    let map = HeaderMap::resolve(schema, &raw.headers);
    let mut report = QualityReport {
        rows: raw.rows.len(),
        missing_fields: map.missing().iter().map(|f| f.name().to_string()).collect(),
        ..Default::default()
    };
    if !report.missing_fields.is_empty() {
        warn!(fields = ?report.missing_fields, "canonical fields absent from source, using defaults");
    }

    let extras = schema.extras();
    let missing_extras: Vec<&str> = extras
        .iter()
        .enumerate()
        .filter(|(idx, _)| map.extra_column(*idx).is_none())
        .map(|(_, e)| e.name.as_str())
        .collect();
    if !missing_extras.is_empty() {
        warn!(fields = ?missing_extras, "configured extra columns absent from source");
        report
            .missing_fields
            .extend(missing_extras.iter().map(|s| s.to_string()));
    }

    let mut seen: HashSet<&[String]> = HashSet::new();
    let mut rows = Vec::with_capacity(raw.rows.len());

    for (idx, cells) in raw.rows.iter().enumerate() {
        if !seen.insert(cells.as_slice()) {
            report.duplicate_rows += 1;
        }
        let cell = move |column: Option<usize>| column.and_then(|c| cells.get(c)).map(String::as_str);

        let mut row = CanonicalRow::empty(extras.len());
        for field in CanonicalField::ALL {
            let value = cell(map.column(field));
            if field.is_numeric() {
                let v = coerce(value, field.name(), &mut report);
                row.counts.set(field, v);
            } else {
                match clean_label(value) {
                    Some(text) => row.set_text(field, text),
                    None => report.note_default(field.name()),
                }
            }
        }
        for (slot, (extra_idx, extra)) in row.extras.iter_mut().zip(extras.iter().enumerate()) {
            *slot = coerce(cell(map.extra_column(extra_idx)), &extra.name, &mut report);
        }

        row.department_code = department_code(&row.department_number, &row.department);
        row.zone = special_service(&row.department)
            .unwrap_or_else(|| classify_zone(&row.department_number, &row.zone_label))
            .to_string();
        // Derived figures only ever see coerced counts.
        row.derived = Derived::from_counts(&row.counts);

        check_overlaps(idx, &row, &mut report);
        rows.push(row);
    }

    if report.has_overlaps() {
        warn!(
            rows = report.overlaps.len(),
            "rows with overlapping subcategories; shares may exceed 100%"
        );
    }
    debug!(
        rows = report.rows,
        defaulted = report.defaulted_total(),
        duplicates = report.duplicate_rows,
        "normalized source table"
    );

    let extra_names = extras.iter().map(|e| e.name.clone()).collect();
    (CanonicalTable::new(rows, extra_names), report)
}

fn coerce(value: Option<&str>, field: &str, report: &mut QualityReport) -> f64 {
    let coerced = coerce_number(value);
    match coerced {
        Coerced::Value(_) => {}
        Coerced::Blank => report.note_default(field),
        Coerced::Unparseable => {
            report.unparseable_cells += 1;
            report.note_default(field);
        }
        Coerced::OutOfRange => {
            report.out_of_range_cells += 1;
            report.note_default(field);
        }
    }
    coerced.value_or_zero()
}

fn check_overlaps(idx: usize, row: &CanonicalRow, report: &mut QualityReport) {
    let c = &row.counts;
    let mut flag = |kind: OverlapKind, subtotal: f64, total: f64| {
        debug!(row = idx, department = %row.department, ?kind, subtotal, total, "overlapping subcategories");
        report.overlaps.push(OverlapFlag {
            row: idx,
            department: row.department.clone(),
            category: row.category.clone(),
            kind,
            subtotal,
            total,
        });
    };
    let subtotal = c.exclusive_subtotal();
    if subtotal > c.total_interventions {
        flag(OverlapKind::SubcategoriesExceedTotal, subtotal, c.total_interventions);
    }
    if c.residential_fires > c.fires {
        flag(OverlapKind::ResidentialExceedsFires, c.residential_fires, c.fires);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ExtraField;
    use crate::util::NOT_PROVIDED;

    fn raw(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
            encoding: "UTF-8",
            delimiter: b';',
        }
    }

    #[test]
    fn missing_columns_become_defaults() {
        let table = raw(&["Région", "Total interventions"], &[&["Bretagne", "1 200"]]);
        let (rows, report) = normalize(&table, &Schema::default());
        let row = &rows.rows()[0];
        assert_eq!(row.region, "Bretagne");
        assert_eq!(row.counts.total_interventions, 1200.0);
        assert_eq!(row.department, NOT_PROVIDED);
        assert_eq!(row.category, NOT_PROVIDED);
        assert_eq!(row.counts.fires, 0.0);
        assert_eq!(row.department_code, "00");
        assert_eq!(row.zone, ZONE_MAINLAND);
        assert!(report.missing_fields.contains(&"Incendies".to_string()));
        assert_eq!(report.defaulted_cells.get("Incendies"), Some(&1));
    }

    #[test]
    fn derived_fields_use_coerced_counts() {
        let table = raw(
            &[
                "Malaises à domicile : urgence vitale",
                "Malaises à domicile : carence",
                "Secours à victime",
                "Secours à personne",
            ],
            &[&["75", "25", "1 000", "500,5"], &["N/A", "", "x", "2"]],
        );
        let (rows, report) = normalize(&table, &Schema::default());
        let first = &rows.rows()[0];
        assert_eq!(first.derived.total_malaise, 100.0);
        assert_eq!(first.derived.shortage_rate, 25.0);
        assert_eq!(first.derived.total_medical, 1500.5);
        let second = &rows.rows()[1];
        assert_eq!(second.derived.total_malaise, 0.0);
        assert_eq!(second.derived.shortage_rate, 0.0);
        assert_eq!(second.derived.total_medical, 2.0);
        assert_eq!(report.unparseable_cells, 2);
    }

    #[test]
    fn blank_and_placeholder_labels_use_sentinel() {
        let table = raw(&["Région", "Département"], &[&["  ", "nan"]]);
        let (rows, _) = normalize(&table, &Schema::default());
        assert_eq!(rows.rows()[0].region, NOT_PROVIDED);
        assert_eq!(rows.rows()[0].department, NOT_PROVIDED);
    }

    #[test]
    fn classifies_zones() {
        assert_eq!(classify_zone("BSPP", "Métropole"), ZONE_PARIS);
        assert_eq!(classify_zone("bmpm", ""), ZONE_MARSEILLE);
        assert_eq!(classify_zone("973", "Guyane"), ZONE_OVERSEAS);
        assert_eq!(classify_zone("974", "La Réunion"), ZONE_OVERSEAS);
        assert_eq!(classify_zone("29", "Métropole"), ZONE_MAINLAND);
        assert_eq!(classify_zone("29", NOT_PROVIDED), ZONE_MAINLAND);
    }

    #[test]
    fn service_identifier_in_department_column_is_recognised() {
        let table = raw(&["Numéro", "Département", "Zone"], &[&["", "BSPP", "Métropole"]]);
        let (rows, _) = normalize(&table, &Schema::default());
        assert_eq!(rows.rows()[0].zone, ZONE_PARIS);
    }

    #[test]
    fn department_codes_are_two_digits() {
        assert_eq!(department_code("1", "Ain"), "01");
        assert_eq!(department_code("75", "Paris"), "75");
        assert_eq!(department_code("2a", "Corse-du-Sud"), "2A");
        assert_eq!(department_code("5.0", "Hautes-Alpes"), "05");
        assert_eq!(department_code("971", "Guadeloupe"), "971");
        assert_eq!(department_code(NOT_PROVIDED, "9 - Ariège"), "09");
        assert_eq!(department_code("BSPP", "Paris"), "00");
    }

    #[test]
    fn flags_overlapping_subcategories() {
        let table = raw(
            &[
                "Département",
                "Total interventions",
                "Secours à victime",
                "Secours à personne",
                "Incendies",
                "Feux d'habitations-bureaux",
            ],
            &[&["Ain", "100", "80", "60", "10", "12"], &["Aude", "100", "50", "30", "10", "5"]],
        );
        let (rows, report) = normalize(&table, &Schema::default());
        assert_eq!(report.overlaps.len(), 2);
        assert_eq!(report.overlaps[0].kind, OverlapKind::SubcategoriesExceedTotal);
        assert_eq!(report.overlaps[0].subtotal, 150.0);
        assert_eq!(report.overlaps[1].kind, OverlapKind::ResidentialExceedsFires);
        assert!(report.overlaps.iter().all(|o| o.department == "Ain"));
        // The raw share is kept; only display clamps it.
        assert_eq!(rows.rows()[0].derived.medical_share, 140.0);
    }

    #[test]
    fn counts_duplicates_and_out_of_range_cells() {
        let table = raw(
            &["Département", "Incendies"],
            &[&["Ain", "-3"], &["Ain", "-3"], &["Aude", "4"]],
        );
        let (rows, report) = normalize(&table, &Schema::default());
        assert_eq!(report.duplicate_rows, 1);
        assert_eq!(report.out_of_range_cells, 2);
        assert_eq!(rows.rows()[0].counts.fires, 0.0);
        assert_eq!(rows.rows()[2].counts.fires, 4.0);
    }

    #[test]
    fn extra_numeric_fields_are_coerced() {
        let schema = Schema::default().with_extra(ExtraField {
            name: "Risques_technologiques".to_string(),
            synonyms: vec!["Risques technologiques".to_string()],
        });
        let table = raw(&["Région", "Risques technologiques"], &[&["Bretagne", "1 234"]]);
        let (rows, _) = normalize(&table, &schema);
        assert_eq!(rows.rows()[0].extras, vec![1234.0]);
        assert_eq!(rows.extra_names(), &["Risques_technologiques".to_string()]);
    }
}
