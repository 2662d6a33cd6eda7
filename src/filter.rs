use crate::types::SalesRecord;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fmt;

/// User-selected filters. `None` (or a blank string) means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub store: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub supplier: Option<String>,
}

fn active(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self.date_from.is_none()
            && self.date_to.is_none()
            && active(&self.store).is_none()
            && active(&self.brand).is_none()
            && active(&self.category).is_none()
            && active(&self.supplier).is_none()
    }

    /// Inclusive date bounds. A record without a date fails a lower bound
    /// but passes an upper one.
    pub fn matches(&self, r: &SalesRecord) -> bool {
        if let Some(from) = self.date_from {
            if !r.date.is_some_and(|d| d >= from) {
                return false;
            }
        }
        if let (Some(to), Some(d)) = (self.date_to, r.date) {
            if d > to {
                return false;
            }
        }
        let checks = [
            (active(&self.store), &r.store),
            (active(&self.brand), &r.brand),
            (active(&self.category), &r.category),
            (active(&self.supplier), &r.supplier),
        ];
        checks
            .iter()
            .all(|(wanted, actual)| wanted.map_or(true, |w| w == actual.as_str()))
    }
}

impl fmt::Display for FilterCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("no filters");
        }
        let mut parts = Vec::new();
        if let Some(d) = self.date_from {
            parts.push(format!("from {}", d));
        }
        if let Some(d) = self.date_to {
            parts.push(format!("to {}", d));
        }
        for (label, value) in [
            ("store", &self.store),
            ("brand", &self.brand),
            ("category", &self.category),
            ("supplier", &self.supplier),
        ] {
            if let Some(v) = active(value) {
                parts.push(format!("{}={}", label, v));
            }
        }
        f.write_str(&parts.join(", "))
    }
}

/// New view with the records matching every criterion, in source order.
pub fn apply_filters(records: &[SalesRecord], criteria: &FilterCriteria) -> Vec<SalesRecord> {
    if criteria.is_empty() {
        return records.to_vec();
    }
    records
        .iter()
        .filter(|r| criteria.matches(r))
        .cloned()
        .collect()
}

/// Distinct, sorted, non-empty values for the four selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub stores: Vec<String>,
    pub brands: Vec<String>,
    pub categories: Vec<String>,
    pub suppliers: Vec<String>,
}

impl FilterOptions {
    pub fn from_records(records: &[SalesRecord]) -> Self {
        fn distinct<'a>(values: impl Iterator<Item = &'a String>) -> Vec<String> {
            values
                .filter(|v| !v.is_empty())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .cloned()
                .collect()
        }
        Self {
            stores: distinct(records.iter().map(|r| &r.store)),
            brands: distinct(records.iter().map(|r| &r.brand)),
            categories: distinct(records.iter().map(|r| &r.category)),
            suppliers: distinct(records.iter().map(|r| &r.supplier)),
        }
    }
}
