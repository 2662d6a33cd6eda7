// Aggregation engine. Every function is a pure pass over a record slice;
// nothing is cached between calls.
use crate::types::{
    ChartSeries, DashboardReport, GroupField, KpiRow, KpiSet, NumericField, ProductRow,
    ProductStatus, ProductSummary, SalesRecord, SeriesRow,
};
use crate::util::{average, format_currency, format_int, format_number, percent_of, round_half_up};
use chrono::{Datelike, NaiveDate};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

pub const UNKNOWN_LABEL: &str = "Unknown";
pub const TABLE_LIMIT: usize = 20;
const LOW_MARGIN_PCT: f64 = 5.0;

pub fn compute_kpis(data: &[SalesRecord]) -> KpiSet {
    let total = |field: NumericField| data.iter().map(|r| field.value(r)).sum::<f64>();
    let total_sales = total(NumericField::SalePrice);
    let total_commission = total(NumericField::Commission);
    let total_logistics = total(NumericField::Logistics);

    let margins: Vec<f64> = data.iter().map(|r| r.margin).collect();
    let unique_products: HashSet<&str> = data.iter().map(|r| r.sku.as_str()).collect();
    let active_stores: HashSet<&str> = data.iter().map(|r| r.store.as_str()).collect();

    KpiSet {
        total_sales,
        total_profit: total(NumericField::Profit),
        total_quantity: total(NumericField::Quantity),
        total_commission,
        total_logistics,
        unique_products: unique_products.len(),
        active_stores: active_stores.len(),
        avg_margin: average(&margins),
        problem_products: data
            .iter()
            .filter(|r| r.profit < 0.0 || r.margin < LOW_MARGIN_PCT)
            .count(),
        commission_share: percent_of(total_commission, total_sales),
        logistics_share: percent_of(total_logistics, total_sales),
        sales_growth: month_over_month(data, NumericField::SalePrice),
        profit_change: month_over_month(data, NumericField::Profit),
    }
}

/// Percent change of the latest dated month against the month before it
/// in the data. `None` with fewer than two months or a zero base.
pub fn month_over_month(data: &[SalesRecord], field: NumericField) -> Option<f64> {
    let mut by_month: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for r in data {
        if let Some(d) = r.date {
            *by_month.entry((d.year(), d.month())).or_insert(0.0) += field.value(r);
        }
    }
    let mut months = by_month.values().rev();
    let latest = *months.next()?;
    let previous = *months.next()?;
    if previous == 0.0 {
        return None;
    }
    Some((latest - previous) / previous.abs() * 100.0)
}

/// Daily sums of `field`, ascending by day. Undated records are skipped.
pub fn aggregate_by_date(data: &[SalesRecord], field: NumericField) -> ChartSeries {
    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for r in data {
        if let Some(d) = r.date {
            *by_day.entry(d).or_insert(0.0) += field.value(r);
        }
    }
    ChartSeries {
        labels: by_day.keys().map(|d| d.format("%Y-%m-%d").to_string()).collect(),
        values: by_day.values().map(|v| round_half_up(*v)).collect(),
    }
}

/// Sums of `value` per `group`, largest first. Ties keep first-seen order.
pub fn aggregate_by_field(
    data: &[SalesRecord],
    group: GroupField,
    value: NumericField,
) -> ChartSeries {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut sums: Vec<(&str, f64)> = Vec::new();
    for r in data {
        let key = match group.key(r) {
            "" => UNKNOWN_LABEL,
            k => k,
        };
        let slot = *index.entry(key).or_insert_with(|| {
            sums.push((key, 0.0));
            sums.len() - 1
        });
        sums[slot].1 += value.value(r);
    }
    sums.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ChartSeries {
        labels: sums.iter().map(|(k, _)| k.to_string()).collect(),
        values: sums.iter().map(|(_, v)| round_half_up(*v)).collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    QuantityDesc,
    ProfitAsc,
}

#[derive(Debug, Clone, Copy)]
pub struct RankOptions {
    pub order: RankOrder,
    pub limit: usize,
    pub filter: Option<fn(&ProductSummary) -> bool>,
}

pub fn is_underperformer(p: &ProductSummary) -> bool {
    p.profit < 0.0 || (p.sales > 0.0 && p.margin < LOW_MARGIN_PCT)
}

fn classify(profit: f64, sales: f64, margin: f64) -> ProductStatus {
    if profit < 0.0 {
        ProductStatus::Loss
    } else if sales > 0.0 && margin < LOW_MARGIN_PCT {
        ProductStatus::LowMargin
    } else {
        ProductStatus::Healthy
    }
}

/// Per-SKU totals, in first-seen order. Name and brand come from the
/// first record of each SKU.
pub fn summarize_products(data: &[SalesRecord]) -> Vec<ProductSummary> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut products: Vec<ProductSummary> = Vec::new();
    for r in data {
        let slot = *index.entry(r.sku.as_str()).or_insert_with(|| {
            products.push(ProductSummary {
                sku: r.sku.clone(),
                name: r.name.clone(),
                brand: r.brand.clone(),
                quantity: 0.0,
                sales: 0.0,
                profit: 0.0,
                margin: 0.0,
                status: ProductStatus::Healthy,
            });
            products.len() - 1
        });
        let p = &mut products[slot];
        p.quantity += r.quantity;
        p.sales += r.sale_price;
        p.profit += r.profit;
    }
    for p in &mut products {
        p.margin = percent_of(p.profit, p.sales);
        p.status = classify(p.profit, p.sales, p.margin);
    }
    products
}

pub fn rank_products(data: &[SalesRecord], opts: RankOptions) -> Vec<ProductSummary> {
    let mut products = summarize_products(data);
    if let Some(keep) = opts.filter {
        products.retain(|p| keep(p));
    }
    match opts.order {
        RankOrder::QuantityDesc => products
            .sort_by(|a, b| b.quantity.partial_cmp(&a.quantity).unwrap_or(Ordering::Equal)),
        RankOrder::ProfitAsc => {
            products.sort_by(|a, b| a.profit.partial_cmp(&b.profit).unwrap_or(Ordering::Equal))
        }
    }
    products.truncate(opts.limit);
    products
}

pub fn top_products(data: &[SalesRecord], limit: usize) -> Vec<ProductSummary> {
    rank_products(
        data,
        RankOptions {
            order: RankOrder::QuantityDesc,
            limit,
            filter: None,
        },
    )
}

pub fn underperformers(data: &[SalesRecord], limit: usize) -> Vec<ProductSummary> {
    rank_products(
        data,
        RankOptions {
            order: RankOrder::ProfitAsc,
            limit,
            filter: Some(is_underperformer),
        },
    )
}

/// Case-insensitive match on SKU, name or brand; blank text keeps all.
pub fn search_products<'a>(items: &'a [ProductSummary], text: &str) -> Vec<&'a ProductSummary> {
    let needle = text.trim().to_lowercase();
    items
        .iter()
        .filter(|p| {
            needle.is_empty()
                || [&p.sku, &p.name, &p.brand]
                    .iter()
                    .any(|s| s.to_lowercase().contains(&needle))
        })
        .collect()
}

pub fn build_dashboard(data: &[SalesRecord]) -> DashboardReport {
    DashboardReport {
        record_count: data.len(),
        kpis: compute_kpis(data),
        sales_by_date: aggregate_by_date(data, NumericField::SalePrice),
        profit_by_date: aggregate_by_date(data, NumericField::Profit),
        sales_by_brand: aggregate_by_field(data, GroupField::Brand, NumericField::SalePrice)
            .truncated(8),
        profit_by_category: aggregate_by_field(data, GroupField::Category, NumericField::Profit)
            .truncated(10),
        sales_by_store: aggregate_by_field(data, GroupField::Store, NumericField::SalePrice),
        profit_by_supplier: aggregate_by_field(data, GroupField::Supplier, NumericField::Profit)
            .truncated(8),
        top_products: top_products(data, TABLE_LIMIT),
        underperformers: underperformers(data, TABLE_LIMIT),
    }
}

fn format_change(change: Option<f64>) -> String {
    match change {
        Some(c) => format!("{:+.1}%", c),
        None => "n/a".to_string(),
    }
}

pub fn kpi_rows(k: &KpiSet) -> Vec<KpiRow> {
    let row = |metric: &str, value: String| KpiRow {
        metric: metric.to_string(),
        value,
    };
    vec![
        row("Total sales", format_currency(k.total_sales, false)),
        row("Sales growth (MoM)", format_change(k.sales_growth)),
        row("Net profit", format_currency(k.total_profit, false)),
        row("Profit change (MoM)", format_change(k.profit_change)),
        row("Units sold", format_number(k.total_quantity, 0)),
        row("Unique products", format_int(k.unique_products)),
        row("Average margin", format!("{:.1}%", k.avg_margin)),
        row(
            "Marketplace commission",
            format!(
                "{} ({:.1}% of sales)",
                format_currency(k.total_commission, false),
                k.commission_share
            ),
        ),
        row(
            "Logistics",
            format!(
                "{} ({:.1}% of sales)",
                format_currency(k.total_logistics, false),
                k.logistics_share
            ),
        ),
        row("Active stores", format_int(k.active_stores)),
        row("Problem rows", format_int(k.problem_products)),
    ]
}

pub fn series_rows(series: &ChartSeries) -> Vec<SeriesRow> {
    series
        .labels
        .iter()
        .zip(&series.values)
        .map(|(label, value)| SeriesRow {
            label: label.clone(),
            value: *value,
        })
        .collect()
}

pub fn product_rows(products: &[ProductSummary]) -> Vec<ProductRow> {
    products
        .iter()
        .enumerate()
        .map(|(idx, p)| ProductRow {
            rank: idx + 1,
            sku: p.sku.clone(),
            name: p.name.clone(),
            brand: p.brand.clone(),
            quantity: format_number(p.quantity, 0),
            sales: format_currency(p.sales, false),
            profit: format_currency(p.profit, false),
            margin: format!("{:.1}%", p.margin),
            status: p.status.to_string(),
        })
        .collect()
}
