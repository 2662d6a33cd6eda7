// Session state for one dashboard run.
//
// Lifecycle: `Dashboard::new()` starts empty, `load`/`load_file` populate
// `all_records` once (and reset the view), `apply_filters` replaces the
// filtered view, `report` recomputes everything from the current view.
// A failed load leaves the previous contents untouched.
use crate::error::LoadError;
use crate::filter::{apply_filters, FilterCriteria, FilterOptions};
use crate::loader::{load_csv_file, normalize};
use crate::reports::build_dashboard;
use crate::transport::{HttpFetch, Source, TransportResolver};
use crate::types::{DashboardReport, RawRecord, SalesRecord};
use chrono::{DateTime, Local};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub source: Source,
    pub raw_rows: usize,
    pub records: usize,
    pub dropped: usize,
}

#[derive(Debug, Default)]
pub struct Dashboard {
    all_records: Vec<SalesRecord>,
    filtered: Vec<SalesRecord>,
    criteria: FilterCriteria,
    source: Option<Source>,
    loaded_at: Option<DateTime<Local>>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch through the transport chain and install the result.
    pub fn load<F: HttpFetch>(
        &mut self,
        resolver: &TransportResolver<F>,
    ) -> Result<LoadReport, LoadError> {
        let fetched = resolver.resolve()?;
        Ok(self.install(fetched.source, &fetched.rows))
    }

    pub fn load_file(&mut self, path: &Path) -> Result<LoadReport, LoadError> {
        let rows = load_csv_file(path)?;
        Ok(self.install(Source::LocalFile, &rows))
    }

    fn install(&mut self, source: Source, rows: &[RawRecord]) -> LoadReport {
        let records = normalize(rows);
        let report = LoadReport {
            source,
            raw_rows: rows.len(),
            records: records.len(),
            dropped: rows.len() - records.len(),
        };
        tracing::info!(
            "Processed data: {} rows from {} ({} dropped)",
            report.records,
            source,
            report.dropped
        );
        self.filtered = records.clone();
        self.all_records = records;
        self.criteria = FilterCriteria::default();
        self.source = Some(source);
        self.loaded_at = Some(Local::now());
        report
    }

    /// Recompute the filtered view from scratch.
    pub fn apply_filters(&mut self, criteria: FilterCriteria) -> &[SalesRecord] {
        self.filtered = apply_filters(&self.all_records, &criteria);
        tracing::debug!(
            "filters applied ({}): {} of {} records",
            criteria,
            self.filtered.len(),
            self.all_records.len()
        );
        self.criteria = criteria;
        &self.filtered
    }

    pub fn clear_filters(&mut self) -> &[SalesRecord] {
        self.apply_filters(FilterCriteria::default())
    }

    pub fn is_loaded(&self) -> bool {
        self.source.is_some()
    }

    pub fn all_records(&self) -> &[SalesRecord] {
        &self.all_records
    }

    pub fn filtered(&self) -> &[SalesRecord] {
        &self.filtered
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn source(&self) -> Option<Source> {
        self.source
    }

    pub fn loaded_at(&self) -> Option<DateTime<Local>> {
        self.loaded_at
    }

    /// Selector choices always come from the full data set.
    pub fn filter_options(&self) -> FilterOptions {
        FilterOptions::from_records(&self.all_records)
    }

    pub fn report(&self) -> DashboardReport {
        build_dashboard(&self.filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{endpoints, Scripted, ScriptedFetcher, CSV, GVIZ, RPC};

    const CSV_BODY: &str = "SKU,SKU Nomi,Dokon,Sotuv narxi,Foyda,Miqdor\n\
                            S1,P1,X,1000,100,5\n\
                            S2,P2,Y,2000,-50,3\n\
                            ,no sku,X,10,1,1\n";

    fn csv_only() -> ScriptedFetcher {
        ScriptedFetcher::default()
            .route(RPC, Scripted::Network)
            .route(GVIZ, Scripted::Network)
            .ok(CSV, CSV_BODY)
    }

    #[test]
    fn load_populates_records_and_view() {
        let fetcher = csv_only();
        let resolver = TransportResolver::new(&fetcher, endpoints());
        let mut dash = Dashboard::new();
        assert!(!dash.is_loaded());

        let report = dash.load(&resolver).unwrap();
        assert_eq!(report.source, Source::CsvExport);
        assert_eq!((report.raw_rows, report.records, report.dropped), (3, 2, 1));
        assert_eq!(dash.all_records().len(), 2);
        assert_eq!(dash.filtered(), dash.all_records());
        assert!(dash.loaded_at().is_some());

        let kpis = dash.report().kpis;
        assert_eq!(kpis.total_sales, 3000.0);
        assert_eq!(kpis.total_profit, 50.0);
        assert_eq!(kpis.problem_products, 1);
    }

    #[test]
    fn terminal_failure_loads_nothing() {
        let fetcher = ScriptedFetcher::default()
            .ok(RPC, r#"{callback}({"status":"error"})"#)
            .ok(GVIZ, "not json at all")
            .route(CSV, Scripted::Reply(404, String::new()));
        let resolver = TransportResolver::new(&fetcher, endpoints());
        let mut dash = Dashboard::new();
        let err = dash.load(&resolver).unwrap_err();
        assert!(matches!(err, LoadError::HttpStatus(404)));
        assert!(dash.all_records().is_empty());
        assert!(!dash.is_loaded());
        assert_eq!(fetcher.calls.borrow().len(), 3);
    }

    #[test]
    fn failed_reload_keeps_previous_data() {
        let good = csv_only();
        let mut dash = Dashboard::new();
        dash.load(&TransportResolver::new(&good, endpoints())).unwrap();

        let bad = ScriptedFetcher::default();
        assert!(dash.load(&TransportResolver::new(&bad, endpoints())).is_err());
        assert_eq!(dash.all_records().len(), 2);
        assert_eq!(dash.source(), Some(Source::CsvExport));
    }

    #[test]
    fn filters_replace_view_without_touching_records() {
        let fetcher = csv_only();
        let mut dash = Dashboard::new();
        dash.load(&TransportResolver::new(&fetcher, endpoints())).unwrap();

        let criteria = FilterCriteria {
            store: Some("Y".into()),
            ..Default::default()
        };
        assert_eq!(dash.apply_filters(criteria.clone()).len(), 1);
        assert_eq!(dash.apply_filters(criteria).len(), 1);
        assert_eq!(dash.all_records().len(), 2);
        assert_eq!(dash.report().kpis.total_sales, 2000.0);
        assert_eq!(dash.filter_options().stores, ["X", "Y"]);

        dash.clear_filters();
        assert!(dash.criteria().is_empty());
        assert_eq!(dash.filtered(), dash.all_records());
    }
}
