use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tabled::Tabled;

/// A single scalar cell as delivered by one of the transports.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// Nested object or array; kept so one odd cell never rejects a batch.
    Other(serde_json::Value),
}

impl RawValue {
    /// Text form of the cell. Whole numbers render without a fractional
    /// part so a numeric SKU like `1042` stays `1042`, not `1042.0`.
    pub fn to_text(&self) -> String {
        match self {
            RawValue::Null => String::new(),
            RawValue::Bool(b) => b.to_string(),
            RawValue::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            RawValue::Text(s) => s.trim().to_string(),
            RawValue::Other(v) => v.to_string(),
        }
    }

    /// `Null` and whitespace-only text count as absent during alias lookup.
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Null => true,
            RawValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

/// Untyped source row: column label -> cell. Labels are whatever the sheet
/// happens to use (Uzbek headers, column letters, English names...).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(HashMap<String, RawValue>);

#[cfg(test)]
impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<RawValue>) {
        self.0.insert(label.into(), value.into());
    }
}

impl RawRecord {
    pub fn get(&self, label: &str) -> Option<&RawValue> {
        self.0.get(label)
    }
}

impl<K: Into<String>, V: Into<RawValue>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        RawRecord(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// One normalized ledger row. Built only by `loader::normalize`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesRecord {
    pub sku: String,
    pub name: String,
    pub supplier: String,
    pub brand: String,
    pub category: String,
    pub store: String,
    pub date: Option<NaiveDate>,
    pub quantity: f64,
    pub purchase_price: f64,
    pub commission: f64,
    pub logistics: f64,
    pub sale_price: f64,
    pub profit: f64,
    pub markup: f64,
    pub yandex_payment: f64,
    pub tax: f64,
    pub total_cost: f64,
    pub margin: f64,
}

/// Numeric columns that can be summed by the aggregation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericField {
    Quantity,
    Commission,
    Logistics,
    SalePrice,
    Profit,
}

impl NumericField {
    pub fn value(self, r: &SalesRecord) -> f64 {
        match self {
            NumericField::Quantity => r.quantity,
            NumericField::Commission => r.commission,
            NumericField::Logistics => r.logistics,
            NumericField::SalePrice => r.sale_price,
            NumericField::Profit => r.profit,
        }
    }
}

/// Categorical columns usable as a group-by key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    Supplier,
    Brand,
    Category,
    Store,
}

impl GroupField {
    pub fn key(self, r: &SalesRecord) -> &str {
        match self {
            GroupField::Supplier => &r.supplier,
            GroupField::Brand => &r.brand,
            GroupField::Category => &r.category,
            GroupField::Store => &r.store,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiSet {
    pub total_sales: f64,
    pub total_profit: f64,
    pub total_quantity: f64,
    pub total_commission: f64,
    pub total_logistics: f64,
    pub unique_products: usize,
    pub active_stores: usize,
    pub avg_margin: f64,
    pub problem_products: usize,
    pub commission_share: f64,
    pub logistics_share: f64,
    /// Month-over-month change of sales, `None` without two dated months.
    pub sales_growth: Option<f64>,
    pub profit_change: Option<f64>,
}

/// Chart-ready label/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub values: Vec<i64>,
}

impl ChartSeries {
    /// First `n` entries; the series is already ordered by the producer.
    pub fn truncated(&self, n: usize) -> ChartSeries {
        ChartSeries {
            labels: self.labels.iter().take(n).cloned().collect(),
            values: self.values.iter().take(n).copied().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProductStatus {
    Loss,
    LowMargin,
    Healthy,
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProductStatus::Loss => "Loss",
            ProductStatus::LowMargin => "Low margin",
            ProductStatus::Healthy => "OK",
        };
        f.write_str(s)
    }
}

/// Per-SKU rollup used by the ranked tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSummary {
    pub sku: String,
    pub name: String,
    pub brand: String,
    pub quantity: f64,
    pub sales: f64,
    pub profit: f64,
    pub margin: f64,
    pub status: ProductStatus,
}

/// Everything one render pass of the dashboard consumes.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub record_count: usize,
    pub kpis: KpiSet,
    pub sales_by_date: ChartSeries,
    pub profit_by_date: ChartSeries,
    pub sales_by_brand: ChartSeries,
    pub profit_by_category: ChartSeries,
    pub sales_by_store: ChartSeries,
    pub profit_by_supplier: ChartSeries,
    pub top_products: Vec<ProductSummary>,
    pub underperformers: Vec<ProductSummary>,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct KpiRow {
    #[serde(rename = "Metric")]
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[serde(rename = "Value")]
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct SeriesRow {
    #[serde(rename = "Label")]
    #[tabled(rename = "Label")]
    pub label: String,
    #[serde(rename = "Value")]
    #[tabled(rename = "Value")]
    pub value: i64,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ProductRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "SKU")]
    #[tabled(rename = "SKU")]
    pub sku: String,
    #[serde(rename = "Name")]
    #[tabled(rename = "Name")]
    pub name: String,
    #[serde(rename = "Brand")]
    #[tabled(rename = "Brand")]
    pub brand: String,
    #[serde(rename = "Quantity")]
    #[tabled(rename = "Quantity")]
    pub quantity: String,
    #[serde(rename = "Sales")]
    #[tabled(rename = "Sales")]
    pub sales: String,
    #[serde(rename = "Profit")]
    #[tabled(rename = "Profit")]
    pub profit: String,
    #[serde(rename = "Margin")]
    #[tabled(rename = "Margin")]
    pub margin: String,
    #[serde(rename = "Status")]
    #[tabled(rename = "Status")]
    pub status: String,
}
