// Filtering and grouping over canonical rows.
//
// All functions are pure: they borrow rows and return new views or
// summaries. Group rates are recomputed from summed counts (see
// `Totals::add_row`), never averaged from per-row rates.
use crate::schema::CanonicalField;
use crate::types::{
    CanonicalRow, FilterPredicate, FilteredView, GroupKey, Metric, MetricStats, TerritoryMetric,
    Totals,
};
use crate::util::{average, median, NOT_PROVIDED};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// `part / whole * 100`, or 0 when `whole` is 0.
pub fn percent_of(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        return 0.0;
    }
    let pct = part / whole * 100.0;
    if pct.is_finite() {
        pct
    } else {
        0.0
    }
}

/// [`percent_of`] clamped to `[0, 100]` for display. Values above 100 come
/// from overlapping source categories, which the quality report flags.
pub fn display_percent(part: f64, whole: f64) -> f64 {
    percent_of(part, whole).clamp(0.0, 100.0)
}

/// Keep the rows matching every constraint of the predicate, in order.
pub fn apply_filter<'a, I>(rows: I, predicate: &FilterPredicate) -> FilteredView<'a>
where
    I: IntoIterator<Item = &'a CanonicalRow>,
{
    rows.into_iter().filter(|r| predicate.matches(r)).collect()
}

/// One partition of a [`GroupSummary`].
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: String,
    /// Display label; differs from `key` only for territory groups.
    pub label: String,
    pub totals: Totals,
}

/// Groups in order of first appearance. A group is identified by its key
/// and label together.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub key: GroupKey,
    groups: Vec<Group>,
}

impl GroupSummary {
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn get(&self, key: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.key == key)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// `key -> metric value`, in group order.
    pub fn values(&self, metric: Metric) -> Vec<(&str, f64)> {
        self.groups
            .iter()
            .map(|g| (g.key.as_str(), metric.value(&g.totals)))
            .collect()
    }
}

/// Partition rows by `key` and sum every numeric attribute per partition.
pub fn group_by<'a, I>(rows: I, key: GroupKey) -> GroupSummary
where
    I: IntoIterator<Item = &'a CanonicalRow>,
{
    let mut index: HashMap<(&'a str, &'a str), usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();
    for row in rows {
        let k = key.key_of(row);
        let label = key.label_of(row);
        let slot = *index.entry((k, label)).or_insert_with(|| {
            groups.push(Group {
                key: k.to_string(),
                label: label.to_string(),
                totals: Totals::default(),
            });
            groups.len() - 1
        });
        groups[slot].totals.add_row(row);
    }
    GroupSummary { key, groups }
}

/// The `n` groups with the highest `metric`, descending. Ties keep their
/// order of first appearance.
pub fn top_n(summary: &GroupSummary, metric: Metric, n: usize) -> Vec<&Group> {
    let mut ranked: Vec<&Group> = summary.groups.iter().collect();
    ranked.sort_by(|a, b| {
        metric
            .value(&b.totals)
            .partial_cmp(&metric.value(&a.totals))
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(n);
    ranked
}

pub fn metric_stats(summary: &GroupSummary, metric: Metric) -> MetricStats {
    let values: Vec<f64> = summary
        .groups
        .iter()
        .map(|g| metric.value(&g.totals))
        .collect();
    if values.is_empty() {
        return MetricStats {
            mean: 0.0,
            median: 0.0,
            max: 0.0,
            min: 0.0,
        };
    }
    MetricStats {
        mean: average(&values),
        max: values.iter().copied().fold(f64::MIN, f64::max),
        min: values.iter().copied().fold(f64::MAX, f64::min),
        median: median(values),
    }
}

/// Share chart of intervention types.
pub fn category_breakdown(t: &Totals) -> Vec<(&'static str, f64)> {
    vec![
        ("Secours à victime", t.counts.victim_rescue),
        ("Secours à personne", t.counts.person_rescue),
        ("Incendies", t.counts.fires),
        ("Accidents circulation", t.counts.road_accidents),
        ("Opérations diverses", t.counts.misc_operations),
    ]
}

pub fn medical_breakdown(t: &Totals) -> Vec<(&'static str, f64)> {
    vec![
        ("Secours à victime", t.counts.victim_rescue),
        ("Secours à personne", t.counts.person_rescue),
        ("Urgences vitales", t.counts.malaise_urgent),
        ("Carences", t.counts.malaise_shortage),
    ]
}

/// Residential fires against every other fire. The remainder is floored
/// at zero when residential fires exceed the total.
pub fn fire_split(t: &Totals) -> Vec<(&'static str, f64)> {
    vec![
        ("Feux d'habitations", t.counts.residential_fires),
        (
            "Autres incendies",
            (t.counts.fires - t.counts.residential_fires).max(0.0),
        ),
    ]
}

/// Metric per territory (code and department), ready to join with
/// boundary data.
pub fn territory_metrics<'a, I>(rows: I, metric: Metric) -> Vec<TerritoryMetric>
where
    I: IntoIterator<Item = &'a CanonicalRow>,
{
    group_by(rows, GroupKey::Territory)
        .groups
        .into_iter()
        .map(|g| TerritoryMetric {
            value: metric.value(&g.totals),
            code: g.key,
            department: g.label,
        })
        .collect()
}

/// One column of the tabular view.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<String>,
}

/// Canonical field name to row values, in schema order, followed by the
/// extra numeric fields and the derived figures.
pub fn table_columns(rows: &[&CanonicalRow], extra_names: &[String]) -> Vec<Column> {
    let mut columns: Vec<Column> = CanonicalField::ALL
        .into_iter()
        .map(|field| Column {
            name: field.name().to_string(),
            values: rows
                .iter()
                .map(|r| match r.text(field) {
                    Some(text) => text.to_string(),
                    None => r.counts.get(field).unwrap_or(0.0).to_string(),
                })
                .collect(),
        })
        .collect();

    let mut push = |name: &str, values: Vec<String>| {
        columns.push(Column {
            name: name.to_string(),
            values,
        })
    };
    push("Code_Dept", rows.iter().map(|r| r.department_code.clone()).collect());
    push("Type_Zone", rows.iter().map(|r| r.zone.clone()).collect());
    for (idx, name) in extra_names.iter().enumerate() {
        push(
            name.as_str(),
            rows.iter()
                .map(|r| r.extras.get(idx).copied().unwrap_or(0.0).to_string())
                .collect(),
        );
    }
    push("Total_Malaises", rows.iter().map(|r| r.derived.total_malaise.to_string()).collect());
    push("Total_Medical", rows.iter().map(|r| r.derived.total_medical.to_string()).collect());
    push("Taux_Carence", rows.iter().map(|r| format!("{:.2}", r.derived.shortage_rate)).collect());
    columns
}

/// Sorted distinct values of an attribute, without the sentinel. Feeds
/// the filter choices.
pub fn distinct_values<'a, I, F>(rows: I, attribute: F) -> Vec<String>
where
    I: IntoIterator<Item = &'a CanonicalRow>,
    F: Fn(&'a CanonicalRow) -> &'a str,
{
    rows.into_iter()
        .map(attribute)
        .filter(|v| *v != NOT_PROVIDED)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}
