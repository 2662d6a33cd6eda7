use crate::reports::{kpi_rows, product_rows, series_rows};
use crate::types::{ChartSeries, DashboardReport};
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Box<dyn Error>> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

fn print_series(title: &str, series: &ChartSeries, max_rows: usize) {
    println!("{}\n", title);
    preview_table_rows(&series_rows(series), max_rows);
}

/// Print the dashboard sections to stdout.
pub fn print_dashboard(report: &DashboardReport, max_rows: usize) {
    println!("Key figures ({} rows)\n", report.record_count);
    preview_table_rows(&kpi_rows(&report.kpis), usize::MAX);

    print_series("Sales by day", &report.sales_by_date, max_rows);
    print_series("Profit by day", &report.profit_by_date, max_rows);
    print_series("Sales by brand (top 8)", &report.sales_by_brand, max_rows);
    print_series("Profit by category (top 10)", &report.profit_by_category, max_rows);
    print_series("Sales by store", &report.sales_by_store, max_rows);
    print_series("Profit by supplier (top 8)", &report.profit_by_supplier, max_rows);

    println!("Top products by quantity\n");
    preview_table_rows(&product_rows(&report.top_products), max_rows);
    println!("Loss-making and low-margin products\n");
    preview_table_rows(&product_rows(&report.underperformers), max_rows);
}

/// Write every section of the report into `dir`. Returns the written paths.
pub fn export_dashboard(
    dir: &Path,
    report: &DashboardReport,
) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let path = dir.join("dashboard.json");
    write_json(&path, report)?;
    written.push(path);

    let path = dir.join("kpis.csv");
    write_csv(&path, &kpi_rows(&report.kpis))?;
    written.push(path);

    for (name, series) in [
        ("sales_by_date.csv", &report.sales_by_date),
        ("profit_by_date.csv", &report.profit_by_date),
        ("sales_by_brand.csv", &report.sales_by_brand),
        ("profit_by_category.csv", &report.profit_by_category),
        ("sales_by_store.csv", &report.sales_by_store),
        ("profit_by_supplier.csv", &report.profit_by_supplier),
    ] {
        let path = dir.join(name);
        write_csv(&path, &series_rows(series))?;
        written.push(path);
    }

    for (name, products) in [
        ("top_products.csv", &report.top_products),
        ("underperformers.csv", &report.underperformers),
    ] {
        let path = dir.join(name);
        write_csv(&path, &product_rows(products))?;
        written.push(path);
    }
    Ok(written)
}
