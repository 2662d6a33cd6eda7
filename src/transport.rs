// Transport resolver: fetch the sheet through the first strategy that works.
//
// 1. Apps Script web app (JSONP envelope)
// 2. gviz table query (JSON wrapped in a JS prefix)
// 3. CSV export
//
// Strategies 1 and 2 fail soft: the error is logged and the next one runs.
// A CSV failure ends the load.
use crate::config::DashboardConfig;
use crate::error::{FetchError, LoadError, StrategyError};
use crate::loader::parse_delimited;
use crate::types::{RawRecord, RawValue};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal blocking GET used by every strategy.
pub trait HttpFetch {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply, FetchError>;
}

impl<T: HttpFetch + ?Sized> HttpFetch for &T {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply, FetchError> {
        (**self).get(url, timeout)
    }
}

pub struct ReqwestFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpFetch for ReqwestFetcher {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply, FetchError> {
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout(timeout.as_secs())
            } else {
                FetchError::Network(e.to_string())
            }
        };
        let response = self.client.get(url).timeout(timeout).send().map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(classify)?;
        tracing::debug!(url, status, bytes = body.len(), "GET");
        Ok(HttpReply { status, body })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub rpc_url: Option<String>,
    pub gviz_url: String,
    pub csv_url: String,
    pub timeout: Duration,
}

impl Endpoints {
    pub fn from_config(config: &DashboardConfig) -> Self {
        Self {
            rpc_url: config.rpc_url().map(str::to_string),
            gviz_url: config.gviz_url(),
            csv_url: config.csv_url(),
            timeout: config.timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    RemoteProcedure,
    TabularQuery,
    CsvExport,
    LocalFile,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Source::RemoteProcedure => "Apps Script",
            Source::TabularQuery => "gviz query",
            Source::CsvExport => "CSV export",
            Source::LocalFile => "local file",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct Fetched {
    pub source: Source,
    pub rows: Vec<RawRecord>,
}

static CALLBACK_SEQ: AtomicU64 = AtomicU64::new(0);

/// Callback names currently awaiting a JSONP reply.
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    pending: Mutex<HashSet<String>>,
}

impl CallbackRegistry {
    /// Reserve a fresh `jsonpCallback_<millis>_<seq>` name. It is released
    /// when the returned guard drops, whatever path the call takes.
    pub fn register(&self) -> CallbackGuard<'_> {
        let seq = CALLBACK_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "jsonpCallback_{}_{}",
            chrono::Utc::now().timestamp_millis(),
            seq
        );
        self.lock().insert(name.clone());
        CallbackGuard {
            registry: self,
            name,
        }
    }

    #[cfg(test)]
    pub fn is_pending(&self, name: &str) -> bool {
        self.lock().contains(name)
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct CallbackGuard<'a> {
    registry: &'a CallbackRegistry,
    name: String,
}

impl CallbackGuard<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for CallbackGuard<'_> {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.name);
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    data: Vec<RawRecord>,
}

#[derive(Debug, Deserialize)]
struct GvizResponse {
    table: GvizTable,
}

#[derive(Debug, Deserialize)]
struct GvizTable {
    #[serde(default)]
    cols: Vec<GvizColumn>,
    #[serde(default)]
    rows: Vec<GvizRow>,
}

#[derive(Debug, Deserialize)]
struct GvizColumn {
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GvizRow {
    #[serde(default)]
    c: Vec<Option<GvizCell>>,
}

#[derive(Debug, Deserialize)]
struct GvizCell {
    #[serde(default)]
    v: Option<RawValue>,
}

/// Append the callback parameter, respecting an existing query string.
fn callback_url(base: &str, callback: &str) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{}{}callback={}", base, sep, callback)
}

/// Extract the argument of `callback(...)` from a JSONP script body.
fn unwrap_jsonp<'a>(body: &'a str, callback: &str) -> Result<&'a str, StrategyError> {
    let mismatch = || StrategyError::CallbackMismatch(callback.to_string());
    let s = body.trim();
    let s = s.strip_prefix("/**/").unwrap_or(s).trim_start();
    let s = s.strip_prefix(callback).ok_or_else(mismatch)?.trim_start();
    let s = s.strip_prefix('(').ok_or_else(mismatch)?;
    let s = s.trim_end();
    let s = s.strip_suffix(';').unwrap_or(s).trim_end();
    s.strip_suffix(')').map(str::trim).ok_or_else(mismatch)
}

/// Slice from the first `{` to the last `}`.
fn isolate_json(text: &str) -> Result<&str, StrategyError> {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&text[start..=end]),
        _ => Err(StrategyError::NoJsonObject),
    }
}

/// Zip gviz column labels with row cells. Unlabelled columns become
/// `Column<i>`, null cells become empty text.
fn gviz_rows(table: GvizTable) -> Vec<RawRecord> {
    let labels: Vec<String> = table
        .cols
        .iter()
        .enumerate()
        .map(|(i, col)| match col.label.as_deref().map(str::trim) {
            Some(l) if !l.is_empty() => l.to_string(),
            _ => format!("Column{}", i),
        })
        .collect();

    table
        .rows
        .into_iter()
        .map(|row| {
            let mut cells = row.c.into_iter();
            labels
                .iter()
                .map(|label| {
                    let value = cells
                        .next()
                        .flatten()
                        .and_then(|cell| cell.v)
                        .unwrap_or_else(|| RawValue::Text(String::new()));
                    (label.clone(), value)
                })
                .collect()
        })
        .collect()
}

pub struct TransportResolver<F> {
    fetcher: F,
    endpoints: Endpoints,
    callbacks: CallbackRegistry,
}

impl<F: HttpFetch> TransportResolver<F> {
    pub fn new(fetcher: F, endpoints: Endpoints) -> Self {
        Self {
            fetcher,
            endpoints,
            callbacks: CallbackRegistry::default(),
        }
    }

    #[cfg(test)]
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Try every strategy in order and return the first usable rows.
    pub fn resolve(&self) -> Result<Fetched, LoadError> {
        match self.fetch_rpc() {
            Ok(rows) => {
                return Ok(Fetched {
                    source: Source::RemoteProcedure,
                    rows,
                })
            }
            Err(StrategyError::NotConfigured) => {
                tracing::debug!("Apps Script URL not configured, skipping")
            }
            Err(e) => tracing::warn!("Apps Script JSONP failed: {}", e),
        }

        match self.fetch_gviz() {
            Ok(rows) => {
                return Ok(Fetched {
                    source: Source::TabularQuery,
                    rows,
                })
            }
            Err(e) => tracing::warn!("JSON API failed: {}", e),
        }

        let rows = self.fetch_csv()?;
        Ok(Fetched {
            source: Source::CsvExport,
            rows,
        })
    }

    fn fetch_rpc(&self) -> Result<Vec<RawRecord>, StrategyError> {
        let base = self
            .endpoints
            .rpc_url
            .as_deref()
            .ok_or(StrategyError::NotConfigured)?;
        let callback = self.callbacks.register();
        let url = callback_url(base, callback.name());
        tracing::info!("Trying Apps Script URL with JSONP...");

        let reply = self.fetcher.get(&url, self.endpoints.timeout)?;
        if !reply.is_success() {
            return Err(StrategyError::Status(reply.status));
        }
        let payload = unwrap_jsonp(&reply.body, callback.name())?;
        let envelope: RpcEnvelope = serde_json::from_str(payload)?;
        if envelope.status != "success" {
            return Err(StrategyError::BadStatus(envelope.status));
        }
        if envelope.data.is_empty() {
            return Err(StrategyError::EmptyPayload);
        }
        tracing::info!(
            "Apps Script success: {} rows (reported count {:?})",
            envelope.data.len(),
            envelope.count
        );
        Ok(envelope.data)
    }

    fn fetch_gviz(&self) -> Result<Vec<RawRecord>, StrategyError> {
        tracing::info!("Trying JSON API...");
        let reply = self.fetcher.get(&self.endpoints.gviz_url, self.endpoints.timeout)?;
        if !reply.is_success() {
            return Err(StrategyError::Status(reply.status));
        }
        let parsed: GvizResponse = serde_json::from_str(isolate_json(&reply.body)?)?;
        let rows = gviz_rows(parsed.table);
        tracing::info!("JSON API success: {} rows", rows.len());
        Ok(rows)
    }

    fn fetch_csv(&self) -> Result<Vec<RawRecord>, LoadError> {
        tracing::info!("Trying CSV...");
        let reply = self.fetcher.get(&self.endpoints.csv_url, self.endpoints.timeout)?;
        if !reply.is_success() {
            return Err(LoadError::HttpStatus(reply.status));
        }
        let rows = parse_delimited(reply.body.as_bytes())?;
        tracing::info!("CSV parsed: {} rows", rows.len());
        Ok(rows)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    pub enum Scripted {
        Reply(u16, String),
        Timeout,
        Network,
    }

    /// Fake fetcher answering by URL prefix. `{callback}` in a reply body
    /// is replaced with the callback name found in the request URL.
    #[derive(Default)]
    pub struct ScriptedFetcher {
        routes: Vec<(String, Scripted)>,
        pub calls: RefCell<Vec<String>>,
    }

    impl ScriptedFetcher {
        pub fn route(mut self, prefix: &str, reply: Scripted) -> Self {
            self.routes.push((prefix.to_string(), reply));
            self
        }

        pub fn ok(self, prefix: &str, body: &str) -> Self {
            self.route(prefix, Scripted::Reply(200, body.to_string()))
        }
    }

    impl HttpFetch for ScriptedFetcher {
        fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply, FetchError> {
            self.calls.borrow_mut().push(url.to_string());
            let Some((_, reply)) = self.routes.iter().find(|(p, _)| url.starts_with(p.as_str()))
            else {
                return Err(FetchError::Network(format!("no route for {}", url)));
            };
            match reply {
                Scripted::Reply(status, body) => {
                    let callback = url.split("callback=").nth(1).unwrap_or("");
                    Ok(HttpReply {
                        status: *status,
                        body: body.replace("{callback}", callback),
                    })
                }
                Scripted::Timeout => Err(FetchError::Timeout(timeout.as_secs())),
                Scripted::Network => Err(FetchError::Network("connection refused".into())),
            }
        }
    }

    pub const RPC: &str = "https://rpc.test/exec";
    pub const GVIZ: &str = "https://sheet.test/gviz";
    pub const CSV: &str = "https://sheet.test/csv";

    pub fn endpoints() -> Endpoints {
        Endpoints {
            rpc_url: Some(RPC.to_string()),
            gviz_url: GVIZ.to_string(),
            csv_url: CSV.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}
