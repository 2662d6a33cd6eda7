// Entry point and interactive CLI flow.
//
// - [1] loads the sheet (Apps Script -> gviz -> CSV fallback) or a local
//   CSV export given with `--file`.
// - [2]/[3] set or clear the filters that shape the current view.
// - [4] prints the dashboard for the current view and exports it.
// - [5] searches the product tables.
mod config;
mod error;
mod filter;
mod loader;
mod logging;
mod output;
mod reports;
mod state;
mod transport;
mod types;
mod util;

use clap::Parser;
use config::DashboardConfig;
use filter::FilterCriteria;
use state::{Dashboard, LoadReport};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use transport::{Endpoints, ReqwestFetcher, TransportResolver};

const PREVIEW_ROWS: usize = 10;

#[derive(Parser)]
#[command(author, version, about = "Sales ledger dashboard", long_about = None)]
struct Cli {
    /// Config file (defaults to dashboard.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Read a local CSV export instead of fetching the sheet
    #[arg(long)]
    file: Option<PathBuf>,
    /// Load, print and export once, then exit
    #[arg(long)]
    once: bool,
}

struct App {
    config: DashboardConfig,
    file: Option<PathBuf>,
    dashboard: Dashboard,
}

/// `None` once stdin is closed or unreadable.
fn read_input(label: &str, input: &mut impl BufRead) -> Option<String> {
    print!("{}", label);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match input.read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

fn prompt(label: &str) -> String {
    read_input(label, &mut io::stdin().lock()).unwrap_or_default()
}

/// End of input reads as "0" so a closed stdin leaves the menu.
fn read_choice(input: &mut impl BufRead) -> String {
    read_input("Enter choice: ", input).unwrap_or_else(|| "0".to_string())
}

/// Blank input means "no filter".
fn prompt_optional(label: &str, choices: &[String]) -> Option<String> {
    if !choices.is_empty() {
        println!("  options: {}", choices.join(", "));
    }
    let value = prompt(label);
    (!value.is_empty()).then_some(value)
}

fn prompt_date(label: &str) -> Option<chrono::NaiveDate> {
    loop {
        let value = prompt(label);
        if value.is_empty() {
            return None;
        }
        match util::parse_date(&value) {
            Some(d) => return Some(d),
            None => println!("Invalid date. Use YYYY-MM-DD or leave blank."),
        }
    }
}

fn print_load_report(report: &LoadReport) {
    println!(
        "Processing dataset... ({} rows received via {}, {} kept)",
        util::format_int(report.raw_rows),
        report.source,
        util::format_int(report.records)
    );
    if report.dropped > 0 {
        println!(
            "Note: {} rows skipped (missing SKU or product name).",
            util::format_int(report.dropped)
        );
    }
    println!();
}

impl App {
    fn handle_load(&mut self) {
        let result = match &self.file {
            Some(path) => self.dashboard.load_file(path),
            None => match ReqwestFetcher::new() {
                Ok(fetcher) => {
                    let resolver =
                        TransportResolver::new(fetcher, Endpoints::from_config(&self.config));
                    self.dashboard.load(&resolver)
                }
                Err(e) => Err(e.into()),
            },
        };
        match result {
            Ok(report) => {
                print_load_report(&report);
                if let Some(at) = self.dashboard.loaded_at() {
                    println!("Last update: {}\n", at.format("%H:%M"));
                }
            }
            Err(e) => {
                tracing::error!("Load error: {}", e);
                eprintln!("{}\n", e.user_message());
            }
        }
    }

    fn handle_filters(&mut self) {
        if !self.dashboard.is_loaded() {
            println!("Error: No data loaded. Please load the data first (option 1).\n");
            return;
        }
        let options = self.dashboard.filter_options();
        let criteria = FilterCriteria {
            date_from: prompt_date("Date from (YYYY-MM-DD): "),
            date_to: prompt_date("Date to (YYYY-MM-DD): "),
            store: prompt_optional("Store: ", &options.stores),
            brand: prompt_optional("Brand: ", &options.brands),
            category: prompt_optional("Category: ", &options.categories),
            supplier: prompt_optional("Supplier: ", &options.suppliers),
        };
        let shown = self.dashboard.apply_filters(criteria).len();
        println!(
            "Filters: {} ({} of {} rows)\n",
            self.dashboard.criteria(),
            util::format_int(shown),
            util::format_int(self.dashboard.all_records().len())
        );
    }

    fn handle_clear_filters(&mut self) {
        let shown = self.dashboard.clear_filters().len();
        println!("Filters cleared ({} rows)\n", util::format_int(shown));
    }

    fn handle_generate_reports(&self) {
        if !self.dashboard.is_loaded() {
            println!("Error: No data loaded. Please load the data first (option 1).\n");
            return;
        }
        let report = self.dashboard.report();
        if let Some(source) = self.dashboard.source() {
            println!("Source: {}", source);
        }
        println!("Filters: {}\n", self.dashboard.criteria());
        output::print_dashboard(&report, PREVIEW_ROWS);

        match output::export_dashboard(&self.config.output.dir, &report) {
            Ok(paths) => println!(
                "(Full tables exported to {}: {} files)\n",
                self.config.output.dir.display(),
                paths.len()
            ),
            Err(e) => eprintln!("Write error: {}", e),
        }
    }

    fn handle_search(&self) {
        if !self.dashboard.is_loaded() {
            println!("Error: No data loaded. Please load the data first (option 1).\n");
            return;
        }
        let text = prompt("Search SKU / name / brand: ");
        let products = reports::summarize_products(self.dashboard.filtered());
        let hits: Vec<_> = reports::search_products(&products, &text)
            .into_iter()
            .cloned()
            .collect();
        println!("{} matching products\n", util::format_int(hits.len()));
        output::preview_table_rows(&reports::product_rows(&hits), PREVIEW_ROWS);
    }
}

fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    let mut app = App {
        config,
        file: cli.file,
        dashboard: Dashboard::new(),
    };

    if cli.once {
        app.handle_load();
        app.handle_generate_reports();
        return Ok(());
    }

    loop {
        println!("Sales Dashboard");
        println!("[1] Load data");
        println!("[2] Set filters");
        println!("[3] Clear filters");
        println!("[4] Generate reports");
        println!("[5] Search products");
        println!("[0] Exit\n");
        match read_choice(&mut io::stdin().lock()).as_str() {
            "1" => app.handle_load(),
            "2" => app.handle_filters(),
            "3" => app.handle_clear_filters(),
            "4" => {
                println!();
                app.handle_generate_reports();
            }
            "5" => app.handle_search(),
            "0" => {
                println!("Exiting the program.");
                break;
            }
            _ => println!("Invalid choice. Please enter 0-5.\n"),
        }
    }
    Ok(())
}
