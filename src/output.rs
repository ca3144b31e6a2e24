use crate::aggregate::Column;
use crate::reports::{PageReport, Section, Table as ReportTable};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    fs::write(path, s).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Write a column-oriented table (field name to values) as CSV.
pub fn write_columns(path: &Path, columns: &[Column]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    wtr.write_record(columns.iter().map(|c| c.name.as_str()))?;
    let height = columns.iter().map(|c| c.values.len()).max().unwrap_or(0);
    for row in 0..height {
        wtr.write_record(
            columns
                .iter()
                .map(|c| c.values.get(row).map(String::as_str).unwrap_or("")),
        )?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

fn preview_section(section: &Section, max_rows: usize) {
    println!("{}\n", section.title);
    match &section.table {
        ReportTable::Kpis(rows) => preview_table_rows(rows, max_rows),
        ReportTable::Shares(rows) => preview_table_rows(rows, max_rows),
        ReportTable::Departments(rows) => preview_table_rows(rows, max_rows),
        ReportTable::Regions(rows) => preview_table_rows(rows, max_rows),
        ReportTable::FireRanking(rows) => preview_table_rows(rows, max_rows),
        ReportTable::Zones(rows) => preview_table_rows(rows, max_rows),
        ReportTable::Territories(rows) => preview_table_rows(rows, max_rows),
    }
}

fn write_section(dir: &Path, section: &Section) -> Result<PathBuf> {
    let path = dir.join(format!("{}.csv", section.name));
    match &section.table {
        ReportTable::Kpis(rows) => write_csv(&path, rows)?,
        ReportTable::Shares(rows) => write_csv(&path, rows)?,
        ReportTable::Departments(rows) => write_csv(&path, rows)?,
        ReportTable::Regions(rows) => write_csv(&path, rows)?,
        ReportTable::FireRanking(rows) => write_csv(&path, rows)?,
        ReportTable::Zones(rows) => write_csv(&path, rows)?,
        ReportTable::Territories(rows) => write_csv(&path, rows)?,
    }
    Ok(path)
}

/// Export every section of a page into `dir` and print a preview of each.
/// Returns the files written.
pub fn emit_page(dir: &Path, page: &PageReport, max_rows: usize) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    println!("== {} ==\n", page.title);
    let mut written = Vec::new();
    for section in &page.sections {
        preview_section(section, max_rows);
        let path = write_section(dir, section)?;
        if section.table.len() > max_rows {
            println!("(Full table exported to {})\n", path.display());
        }
        written.push(path);
    }
    Ok(written)
}
