// Entry point and high-level CLI flow.
//
// With `--page`, the binary loads the file, renders that one page and
// exits. Otherwise it runs an interactive menu:
// - option [1] loads and cleans the CSV, printing diagnostics,
// - option [2] sets the region / zone / category filters,
// - the remaining options render one dashboard page each, exporting its
//   tables and a JSON summary to the output directory.
use anyhow::{Context, Result};
use clap::Parser;
use sdis_report::aggregate::{distinct_values, table_columns};
use sdis_report::config::ReportConfig;
use sdis_report::types::{Metric, Page};
use sdis_report::{output, reports, util};
use sdis_report::{FilterPredicate, NavigationState, Repository};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sdis_report")]
#[command(about = "Fire-and-rescue intervention statistics: cleaning, filtering and page reports")]
#[command(version)]
struct Cli {
    /// Source CSV file (overrides config file)
    #[arg(long)]
    data: Option<PathBuf>,

    /// Path to config file (default: ./sdis-report.json if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for exported tables (overrides config file)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Region filter ("Toutes" for none)
    #[arg(long)]
    region: Option<String>,

    /// Zone type filter ("Toutes" for none)
    #[arg(long)]
    zone: Option<String>,

    /// Category filter ("Toutes" for none)
    #[arg(long)]
    category: Option<String>,

    /// Render a single page and exit: context, overview, medical, fires,
    /// geographic or quality
    #[arg(long)]
    page: Option<Page>,

    /// Metric for the geographic page
    #[arg(long, default_value = "shortage-rate")]
    metric: Metric,

    /// Departments shown on the geographic page
    #[arg(long, default_value_t = 20)]
    top: usize,

    /// Debug logging (otherwise RUST_LOG, default warn)
    #[arg(short, long)]
    verbose: bool,
}

/// Everything the menu actions share. Passed explicitly instead of living
/// in a global.
struct Session {
    config: ReportConfig,
    repo: Repository,
    filters: FilterPredicate,
    metric: Metric,
    top: usize,
}

/// Read a single line of input after printing a prompt. `None` once the
/// input is closed.
fn read_line_from(input: &mut impl BufRead, prompt: &str) -> Option<String> {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match input.read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

fn read_line(prompt: &str) -> Option<String> {
    read_line_from(&mut io::stdin().lock(), prompt)
}

fn read_choice() -> Option<String> {
    read_line("Enter choice: ")
}

/// Ask the user whether to go back to the page selection menu.
///
/// Returns `true` if the user chose `Y`, `false` if they chose `N` or
/// closed the input.
fn prompt_back_to_menu() -> bool {
    answer_back_to_menu(&mut io::stdin().lock())
}

fn answer_back_to_menu(input: &mut impl BufRead) -> bool {
    loop {
        let Some(resp) = read_line_from(input, "Back to Page Selection (Y/N): ") else {
            return false;
        };
        match resp.to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

/// Handle option [1]: load and clean the CSV file.
///
/// A load failure is reported once, with every attempted encoding and
/// delimiter, and leaves the session without data.
fn handle_load(session: &mut Session) {
    let path = session.config.data_path.clone();
    match session.repo.load(&path) {
        Ok(dataset) => {
            let q = &dataset.quality;
            println!(
                "Processing dataset... ({} rows loaded, encoding {})",
                util::format_int(dataset.table.len() as u64),
                dataset.encoding
            );
            if !q.missing_fields.is_empty() {
                println!("Note: columns not found, defaulted: {}", q.missing_fields.join(", "));
            }
            println!(
                "Note: {} cells fell back to a default value.",
                util::format_int(q.defaulted_total() as u64)
            );
            if q.has_overlaps() {
                println!(
                    "Warning: {} rows have subcategories exceeding their total (see quality page).",
                    util::format_int(q.overlaps.len() as u64)
                );
            }
            println!();
        }
        Err(e) => {
            eprintln!("Failed to load file: {}\n", e);
        }
    }
}

/// Handle option [2]: pick the three filters from the values present in
/// the data. An empty answer means no constraint.
fn handle_filters(session: &mut Session) {
    let Some(dataset) = session.repo.current() else {
        println!("Error: No data loaded. Please load the CSV file first (option 1).\n");
        return;
    };
    let table = &dataset.table;
    let ask = |label: &str, choices: Vec<String>| {
        println!("{} (Toutes, {})", label, choices.join(", "));
        let answer = read_line(&format!("{}: ", label))?;
        if answer.is_empty() || choices.contains(&answer) || answer == "Toutes" {
            Some(answer)
        } else {
            println!("Unknown value '{}', filter left unset.", answer);
            None
        }
    };
    let region = ask("Région", distinct_values(table, |r| r.region.as_str()));
    let zone = ask("Type de zone", distinct_values(table, |r| r.zone.as_str()));
    let category = ask("Catégorie", distinct_values(table, |r| r.category.as_str()));
    session.filters =
        FilterPredicate::from_selection(region.as_deref(), zone.as_deref(), category.as_deref());
    println!("Filters: {}\n", session.filters);
}

/// Render one page for the current filters and export it.
fn handle_page(session: &Session, state: NavigationState) -> Result<()> {
    let Some(dataset) = session.repo.current() else {
        println!("Error: No data loaded. Please load the CSV file first (option 1).\n");
        return Ok(());
    };
    let view = dataset.view(&session.filters);
    println!(
        "Filters: {} ({} rows)\n",
        session.filters,
        util::format_int(view.len() as u64)
    );

    let out_dir = &session.config.out_dir;
    let page = reports::render(state, &dataset, &view, &session.config);
    output::emit_page(out_dir, &page, session.config.preview_rows)?;

    let columns = table_columns(&view, dataset.table.extra_names());
    output::write_columns(&out_dir.join("filtered_table.csv"), &columns)?;

    let summary = reports::generate_summary(&dataset, &view, &session.filters);
    output::write_json(&out_dir.join("summary.json"), &summary)?;
    println!(
        "Summary Stats (summary.json): {{\"total_interventions\": {}, \"shortage_rate\": {}}}\n",
        util::format_number(summary.total_interventions, 0),
        util::format_percent(summary.shortage_rate)
    );
    Ok(())
}

fn menu_state(choice: &str, session: &Session) -> Option<NavigationState> {
    let state = match choice {
        "3" => NavigationState::Context,
        "4" => NavigationState::Overview,
        "5" => NavigationState::Medical,
        "6" => NavigationState::Fires,
        "7" => NavigationState::Geographic {
            metric: session.metric,
            top_n: session.top,
        },
        "8" => NavigationState::Quality,
        _ => return None,
    };
    Some(state)
}

fn run_interactive(session: &mut Session) -> Result<()> {
    loop {
        println!("Select Page:");
        println!("[1] Load the file");
        println!("[2] Set filters");
        println!("[3] Contexte");
        println!("[4] Vue d'ensemble");
        println!("[5] Urgences médicales");
        println!("[6] Incendies");
        println!("[7] Analyse géographique ({})", session.metric);
        println!("[8] Qualité des données");
        println!("[0] Exit\n");
        let Some(choice) = read_choice() else {
            println!("Exiting the program.");
            return Ok(());
        };
        match choice.as_str() {
            "1" => handle_load(session),
            "2" => handle_filters(session),
            "0" => {
                println!("Exiting the program.");
                return Ok(());
            }
            other => match menu_state(other, session) {
                Some(state) => {
                    println!();
                    if let Err(e) = handle_page(session, state) {
                        eprintln!("Write error: {:#}", e);
                    }
                    if !prompt_back_to_menu() {
                        println!("Exiting the program.");
                        return Ok(());
                    }
                }
                None => println!("Invalid choice. Please enter a number from 0 to 8.\n"),
            },
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cwd = std::env::current_dir().context("failed to read working directory")?;
    let mut config = ReportConfig::discover(cli.config.as_deref(), &cwd)?;
    if let Some(data) = cli.data {
        config.data_path = data;
    }
    if let Some(out_dir) = cli.out_dir {
        config.out_dir = out_dir;
    }

    let mut session = Session {
        repo: Repository::new(config.schema()),
        config,
        filters: FilterPredicate::from_selection(
            cli.region.as_deref(),
            cli.zone.as_deref(),
            cli.category.as_deref(),
        ),
        metric: cli.metric,
        top: cli.top,
    };

    match cli.page {
        Some(page) => {
            let path = session.config.data_path.clone();
            session
                .repo
                .load(&path)
                .with_context(|| format!("cannot build a report from {}", path.display()))?;
            handle_page(&session, page.into_state(session.metric, session.top))
        }
        None => run_interactive(&mut session),
    }
}
