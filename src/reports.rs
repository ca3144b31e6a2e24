use crate::aggregate::{
    category_breakdown, display_percent, fire_split, group_by, medical_breakdown, metric_stats,
    percent_of, top_n,
};
use crate::config::ReportConfig;
use crate::repository::Dataset;
use crate::types::{
    CanonicalRow, DepartmentRankingRow, FireRankingRow, FilterPredicate, GroupKey, KpiRow, Metric,
    NavigationState, RegionShortageRow, ShareRow, SummaryStats, TerritoryRow, Totals, ZoneFireRow,
};
use crate::util::{format_number, format_percent};
use std::collections::HashSet;

/// Shortage rate above which the medical page flags tension.
pub const CRITICAL_SHORTAGE_RATE: f64 = 10.0;

#[derive(Debug, Clone)]
pub enum Table {
    Kpis(Vec<KpiRow>),
    Shares(Vec<ShareRow>),
    Departments(Vec<DepartmentRankingRow>),
    Regions(Vec<RegionShortageRow>),
    FireRanking(Vec<FireRankingRow>),
    Zones(Vec<ZoneFireRow>),
    Territories(Vec<TerritoryRow>),
}

impl Table {
    pub fn len(&self) -> usize {
        match self {
            Table::Kpis(r) => r.len(),
            Table::Shares(r) => r.len(),
            Table::Departments(r) => r.len(),
            Table::Regions(r) => r.len(),
            Table::FireRanking(r) => r.len(),
            Table::Zones(r) => r.len(),
            Table::Territories(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct Section {
    /// File stem used when exporting.
    pub name: &'static str,
    pub title: String,
    pub table: Table,
}

#[derive(Debug, Clone)]
pub struct PageReport {
    pub title: &'static str,
    pub sections: Vec<Section>,
}

impl PageReport {
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }
}

fn kpi(indicator: &str, value: String) -> KpiRow {
    KpiRow {
        indicator: indicator.to_string(),
        value,
    }
}

fn count(v: f64) -> String {
    format_number(v, 0)
}

fn shares(parts: Vec<(&'static str, f64)>, whole: f64) -> Vec<ShareRow> {
    parts
        .into_iter()
        .map(|(label, v)| ShareRow {
            category: label.to_string(),
            count: count(v),
            share: format_percent(display_percent(v, whole)),
        })
        .collect()
}

/// Build the report for one dashboard page from the filtered view.
pub fn render(
    state: NavigationState,
    dataset: &Dataset,
    view: &[&CanonicalRow],
    config: &ReportConfig,
) -> PageReport {
    let sections = match state {
        NavigationState::Context => context(dataset),
        NavigationState::Overview => overview(view, config.top_departments),
        NavigationState::Medical => medical(view, config.top_regions),
        NavigationState::Fires => fires(view, config.top_fires),
        NavigationState::Geographic { metric, top_n } => geographic(view, metric, top_n),
        NavigationState::Quality => quality(dataset),
    };
    PageReport {
        title: state.title(),
        sections,
    }
}

/// National headline figures. Ignores the active filters.
fn context(dataset: &Dataset) -> Vec<Section> {
    let t = Totals::from_rows(&dataset.table);
    let departments: HashSet<&str> = dataset.table.iter().map(|r| r.department.as_str()).collect();
    let rows = vec![
        kpi(
            "Interventions totales",
            format!("{:.1}M", t.counts.total_interventions / 1_000_000.0),
        ),
        kpi(
            "Part médical",
            format_percent(display_percent(t.derived.total_medical, t.counts.total_interventions)),
        ),
        kpi("Incendies", format!("{:.0}K", t.counts.fires / 1_000.0)),
        kpi("Lignes", count(dataset.table.len() as f64)),
        kpi("Départements", count(departments.len() as f64)),
    ];
    vec![Section {
        name: "context_kpis",
        title: "Les pompiers en chiffres".to_string(),
        table: Table::Kpis(rows),
    }]
}

fn overview(view: &[&CanonicalRow], top: usize) -> Vec<Section> {
    let t = Totals::from_rows(view.iter().copied());
    let total = t.counts.total_interventions;
    let kpis = vec![
        kpi("Total interventions", count(total)),
        kpi(
            "Urgences médicales",
            format_percent(display_percent(t.derived.total_medical, total)),
        ),
        kpi(
            "Incendies",
            format!("{} ({})", count(t.counts.fires), format_percent(display_percent(t.counts.fires, total))),
        ),
        kpi(
            "Accidents circulation",
            format!(
                "{} ({})",
                count(t.counts.road_accidents),
                format_percent(display_percent(t.counts.road_accidents, total))
            ),
        ),
    ];

    let summary = group_by(view.iter().copied(), GroupKey::Department);
    let departments = top_n(&summary, Metric::TotalInterventions, top)
        .into_iter()
        .enumerate()
        .map(|(idx, g)| DepartmentRankingRow {
            rank: idx + 1,
            department: g.label.clone(),
            total: count(g.totals.counts.total_interventions),
            medical: count(g.totals.derived.total_medical),
            fires: count(g.totals.counts.fires),
        })
        .collect();

    vec![
        Section {
            name: "overview_kpis",
            title: "Indicateurs clés".to_string(),
            table: Table::Kpis(kpis),
        },
        Section {
            name: "overview_categories",
            title: "Répartition des interventions par type".to_string(),
            table: Table::Shares(shares(category_breakdown(&t), total)),
        },
        Section {
            name: "overview_top_departments",
            title: format!("Top {} des départements - Interventions totales", top),
            table: Table::Departments(departments),
        },
    ]
}

fn medical(view: &[&CanonicalRow], top: usize) -> Vec<Section> {
    let t = Totals::from_rows(view.iter().copied());
    let rate = t.derived.shortage_rate;
    let status = if rate > CRITICAL_SHORTAGE_RATE {
        "Critique"
    } else {
        "Acceptable"
    };
    let kpis = vec![
        kpi("Secours à victime", count(t.counts.victim_rescue)),
        kpi("Secours à personne", count(t.counts.person_rescue)),
        kpi("Urgences vitales", count(t.counts.malaise_urgent)),
        kpi("Taux de carence", format!("{} ({})", format_percent(rate), status)),
    ];

    let breakdown = medical_breakdown(&t);
    let breakdown_total: f64 = breakdown.iter().map(|(_, v)| v).sum();

    let summary = group_by(view.iter().copied(), GroupKey::Region);
    let regions = top_n(&summary, Metric::ShortageRate, top)
        .into_iter()
        .enumerate()
        .map(|(idx, g)| RegionShortageRow {
            rank: idx + 1,
            region: g.label.clone(),
            shortages: count(g.totals.counts.malaise_shortage),
            total_malaise: count(g.totals.derived.total_malaise),
            shortage_rate: format_percent(g.totals.derived.shortage_rate),
        })
        .collect();

    vec![
        Section {
            name: "medical_kpis",
            title: "Urgences médicales".to_string(),
            table: Table::Kpis(kpis),
        },
        Section {
            name: "medical_breakdown",
            title: "Répartition des interventions médicales".to_string(),
            table: Table::Shares(shares(breakdown, breakdown_total)),
        },
        Section {
            name: "medical_top_regions",
            title: format!("Top {} des régions avec le plus fort taux de carence", top),
            table: Table::Regions(regions),
        },
    ]
}

fn fires(view: &[&CanonicalRow], top: usize) -> Vec<Section> {
    let t = Totals::from_rows(view.iter().copied());
    let kpis = vec![
        kpi("Total incendies", count(t.counts.fires)),
        kpi("Feux d'habitations", count(t.counts.residential_fires)),
        kpi(
            "Part des incendies",
            format_percent(display_percent(t.counts.fires, t.counts.total_interventions)),
        ),
        kpi(
            "Habitations/Total",
            format_percent(display_percent(t.counts.residential_fires, t.counts.fires)),
        ),
    ];

    let by_department = group_by(view.iter().copied(), GroupKey::Department);
    let ranking = top_n(&by_department, Metric::Fires, top)
        .into_iter()
        .enumerate()
        .map(|(idx, g)| FireRankingRow {
            rank: idx + 1,
            department: g.label.clone(),
            fires: count(g.totals.counts.fires),
        })
        .collect();

    let zones = group_by(view.iter().copied(), GroupKey::Zone)
        .groups()
        .iter()
        .map(|g| ZoneFireRow {
            zone: g.label.clone(),
            fires: count(g.totals.counts.fires),
            residential_fires: count(g.totals.counts.residential_fires),
            total: count(g.totals.counts.total_interventions),
            fire_share: format_percent(display_percent(
                g.totals.counts.fires,
                g.totals.counts.total_interventions,
            )),
        })
        .collect();

    vec![
        Section {
            name: "fires_kpis",
            title: "Incendies".to_string(),
            table: Table::Kpis(kpis),
        },
        Section {
            name: "fires_top_departments",
            title: format!("Top {} des départements - Incendies", top),
            table: Table::FireRanking(ranking),
        },
        Section {
            name: "fires_split",
            title: "Types d'incendies".to_string(),
            table: Table::Shares(shares(fire_split(&t), t.counts.fires)),
        },
        Section {
            name: "fires_by_zone",
            title: "Incendies par type de zone".to_string(),
            table: Table::Zones(zones),
        },
    ]
}

fn geographic(view: &[&CanonicalRow], metric: Metric, top: usize) -> Vec<Section> {
    let summary = group_by(view.iter().copied(), GroupKey::Territory);
    let stats = metric_stats(&summary, metric);
    let fmt = |v: f64| format_number(v, 1);
    let kpis = vec![
        kpi("Métrique", metric.label().to_string()),
        kpi("Moyenne", fmt(stats.mean)),
        kpi("Médiane", fmt(stats.median)),
        kpi("Maximum", fmt(stats.max)),
        kpi("Minimum", fmt(stats.min)),
    ];

    let rows = top_n(&summary, metric, top)
        .into_iter()
        .enumerate()
        .map(|(idx, g)| TerritoryRow {
            rank: idx + 1,
            code: g.key.clone(),
            department: g.label.clone(),
            total: count(g.totals.counts.total_interventions),
            medical: count(g.totals.derived.total_medical),
            fires: count(g.totals.counts.fires),
            medical_share: format!(
                "{:.1}",
                percent_of(g.totals.derived.total_medical, g.totals.counts.total_interventions)
            ),
            metric: if metric.is_rate() {
                format!("{:.1}", metric.value(&g.totals))
            } else {
                count(metric.value(&g.totals))
            },
        })
        .collect();

    vec![
        Section {
            name: "geographic_stats",
            title: format!("Statistiques - {}", metric.label()),
            table: Table::Kpis(kpis),
        },
        Section {
            name: "geographic_departments",
            title: format!("Top {} départements - {}", top, metric.label()),
            table: Table::Territories(rows),
        },
    ]
}

fn quality(dataset: &Dataset) -> Vec<Section> {
    let q = &dataset.quality;
    let missing = if q.missing_fields.is_empty() {
        "-".to_string()
    } else {
        q.missing_fields.join(", ")
    };
    let mut checks = vec![
        kpi("Encodage", dataset.encoding.to_string()),
        kpi("Lignes", count(q.rows as f64)),
        kpi("Colonnes absentes", missing),
        kpi("Cellules par défaut", count(q.defaulted_total() as f64)),
        kpi("Valeurs illisibles", count(q.unparseable_cells as f64)),
        kpi("Valeurs hors bornes", count(q.out_of_range_cells as f64)),
        kpi("Lignes dupliquées", count(q.duplicate_rows as f64)),
        kpi("Lignes incohérentes", count(q.overlaps.len() as f64)),
    ];
    for (field, n) in &q.defaulted_cells {
        checks.push(kpi(&format!("Défaut: {}", field), count(*n as f64)));
    }

    let overlaps = q
        .overlaps
        .iter()
        .map(|o| {
            kpi(
                &format!("Ligne {} ({} / {})", o.row + 1, o.department, o.category),
                format!("{} > {}", count(o.subtotal), count(o.total)),
            )
        })
        .collect();

    vec![
        Section {
            name: "quality_checks",
            title: "Qualité des données".to_string(),
            table: Table::Kpis(checks),
        },
        Section {
            name: "quality_overlaps",
            title: "Sous-catégories supérieures au total".to_string(),
            table: Table::Kpis(overlaps),
        },
    ]
}

/// Headline figures for `summary.json`.
pub fn generate_summary(
    dataset: &Dataset,
    view: &[&CanonicalRow],
    filters: &FilterPredicate,
) -> SummaryStats {
    let t = Totals::from_rows(view.iter().copied());
    let departments: HashSet<&str> = view.iter().map(|r| r.department.as_str()).collect();
    SummaryStats {
        generated_at: chrono::Utc::now(),
        source: dataset.source.display().to_string(),
        encoding: dataset.encoding.to_string(),
        filters: filters.clone(),
        rows: view.len(),
        departments: departments.len(),
        total_interventions: t.counts.total_interventions,
        total_medical: t.derived.total_medical,
        medical_share: t.derived.medical_share,
        shortage_rate: t.derived.shortage_rate,
        quality: dataset.quality.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_bytes;
    use crate::normalize::normalize;
    use crate::schema::Schema;

    fn dataset(csv: &str) -> Dataset {
        let raw = parse_bytes(csv.as_bytes()).unwrap();
        let (table, quality) = normalize(&raw, &Schema::default());
        Dataset {
            source: "test.csv".into(),
            encoding: raw.encoding,
            delimiter: raw.delimiter,
            table,
            quality,
        }
    }

    const SAMPLE: &str = "Région;Département;Numéro;Zone;Catégorie A;Total interventions;Incendies;Feux d'habitations-bureaux;Secours à victime;Secours à personne;Malaises à domicile : urgence vitale;Malaises à domicile : carence\n\
Bretagne;Finistère;29;Métropole;SDIS;1000;100;40;500;300;90;10\n\
Bretagne;Morbihan;56;Métropole;SDIS;500;50;20;200;150;30;30\n\
Guyane;Guyane;973;Guyane;SDIS;200;30;5;100;60;10;0\n";

    #[test]
    fn overview_ranks_departments_by_total() {
        let ds = dataset(SAMPLE);
        let view: Vec<&CanonicalRow> = ds.table.iter().collect();
        let page = render(NavigationState::Overview, &ds, &view, &ReportConfig::default());
        let Table::Departments(rows) = &page.section("overview_top_departments").unwrap().table else {
            panic!("expected department table");
        };
        assert_eq!(rows[0].department, "Finistère");
        assert_eq!(rows[0].total, "1 000");
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn medical_ranks_regions_by_recomputed_rate() {
        let ds = dataset(SAMPLE);
        let view: Vec<&CanonicalRow> = ds.table.iter().collect();
        let page = render(NavigationState::Medical, &ds, &view, &ReportConfig::default());
        let Table::Regions(rows) = &page.section("medical_top_regions").unwrap().table else {
            panic!("expected region table");
        };
        // Bretagne: 40 / 160 = 25%, Guyane: 0%.
        assert_eq!(rows[0].region, "Bretagne");
        assert_eq!(rows[0].shortage_rate, "25.0%");
        assert_eq!(rows[1].shortage_rate, "0.0%");
    }

    #[test]
    fn fires_page_groups_by_classified_zone() {
        let ds = dataset(SAMPLE);
        let view: Vec<&CanonicalRow> = ds.table.iter().collect();
        let page = render(NavigationState::Fires, &ds, &view, &ReportConfig::default());
        let Table::Zones(rows) = &page.section("fires_by_zone").unwrap().table else {
            panic!("expected zone table");
        };
        let zones: Vec<&str> = rows.iter().map(|r| r.zone.as_str()).collect();
        assert_eq!(zones, vec!["Métropole", "Outre-mer"]);
        assert_eq!(rows[0].fires, "150");
    }

    #[test]
    fn geographic_uses_padded_codes() {
        let ds = dataset(SAMPLE);
        let view: Vec<&CanonicalRow> = ds.table.iter().collect();
        let state = NavigationState::Geographic {
            metric: Metric::TotalInterventions,
            top_n: 50,
        };
        let page = render(state, &ds, &view, &ReportConfig::default());
        let Table::Territories(rows) = &page.section("geographic_departments").unwrap().table else {
            panic!("expected territory table");
        };
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].code, "29");
        assert_eq!(rows[2].code, "973");
    }

    #[test]
    fn military_services_are_separate_territories() {
        let ds = dataset(
            "Numéro;Département;Zone;Total interventions\n\
             BSPP;Paris;Métropole;500\n\
             BMPM;Marseille;Métropole;300\n\
             29;Finistère;Métropole;40\n",
        );
        let view: Vec<&CanonicalRow> = ds.table.iter().collect();
        let state = NavigationState::Geographic {
            metric: Metric::TotalInterventions,
            top_n: 50,
        };
        let page = render(state, &ds, &view, &ReportConfig::default());
        let Table::Territories(rows) = &page.section("geographic_departments").unwrap().table else {
            panic!("expected territory table");
        };
        let got: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.code.as_str(), r.department.as_str()))
            .collect();
        assert_eq!(got, vec![("00", "Paris"), ("00", "Marseille"), ("29", "Finistère")]);

        let page = render(NavigationState::Context, &ds, &view, &ReportConfig::default());
        let Table::Kpis(kpis) = &page.section("context_kpis").unwrap().table else {
            panic!("expected kpi table");
        };
        let departments = kpis.iter().find(|k| k.indicator == "Départements").unwrap();
        assert_eq!(departments.value, "3");
        assert_eq!(generate_summary(&ds, &view, &FilterPredicate::default()).departments, 3);
    }

    #[test]
    fn summary_reflects_filtered_view() {
        let ds = dataset(SAMPLE);
        let filters = FilterPredicate::from_selection(Some("Bretagne"), None, None);
        let view = ds.view(&filters);
        let summary = generate_summary(&ds, &view, &filters);
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.departments, 2);
        assert_eq!(summary.total_interventions, 1500.0);
        assert!((summary.shortage_rate - 25.0).abs() < 1e-9);
    }

    #[test]
    fn quality_page_lists_overlaps() {
        let ds = dataset("Département;Total interventions;Secours à victime\nAin;10;50\n");
        let page = render(NavigationState::Quality, &ds, &[], &ReportConfig::default());
        let section = page.section("quality_overlaps").unwrap();
        assert_eq!(section.table.len(), 1);
    }
}
