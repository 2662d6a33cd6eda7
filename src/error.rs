// Error types for the ingestion pipeline.
//
// Only `LoadError` ever leaves the transport layer; `FetchError` and
// `StrategyError` describe failures that are logged and skipped.
use thiserror::Error;

/// Low-level failure of a single HTTP GET.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("request failed: {0}")]
    Network(String),
}

/// Why a non-final transport strategy gave up. Never surfaced to the user.
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("response does not invoke callback {0}")]
    CallbackMismatch(String),

    #[error("no JSON object in response")]
    NoJsonObject,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("status was {0:?}, expected \"success\"")]
    BadStatus(String),

    #[error("payload is empty")]
    EmptyPayload,

    #[error("not configured")]
    NotConfigured,
}

/// Terminal load failure: the last transport failed or the data could not
/// be read at all.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("HTTP error! status: {0}")]
    HttpStatus(u16),

    #[error("CSV export request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("cannot open {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    /// Message for the person looking at the dashboard, including what to
    /// change on the sheet side.
    pub fn user_message(&self) -> String {
        match self {
            LoadError::File { .. } => format!("Could not read the data file.\n\n{}", self),
            _ => format!(
                "Could not load data from Google Sheets.\n\n{}\n\n\
                 How to fix:\n\
                 1. Open the Google Sheets file\n\
                 2. Click \"Share\"\n\
                 3. Set \"Anyone with the link\" to \"Viewer\"\n\
                 4. Reload the data\n\n\
                 If the problem persists, run with RUST_LOG=debug and check the log.",
                self
            ),
        }
    }
}
