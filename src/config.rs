use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "dashboard.toml";

/// Value shipped in the template config before a real Apps Script
/// deployment URL is filled in.
const RPC_PLACEHOLDER: &str = "PASTE_YOUR_APPS_SCRIPT_URL_HERE";

/// Default configuration embedded in the binary
const DEFAULT_CONFIG: &str = r#"
[sheet]
id = "1a03XfNlJ_5xBE3JpKNzLZ_qf7oWkamRsLo-Hr0MWCm0"
name = "Sheet1"
gid = 0

[transport]
apps_script_url = "https://script.google.com/macros/s/AKfycbwsKE6dmeE22aSXN-M8lxdDHuS7gz1X0OCmK81jzeqc1xw7IJMJ8Bl1M_DRE3NablhDIA/exec"
timeout_secs = 30

[output]
dir = "."
"#;

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub sheet: SheetConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SheetConfig {
    pub id: String,
    #[serde(default = "default_sheet_name")]
    pub name: String,
    #[serde(default)]
    pub gid: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    #[serde(default)]
    pub apps_script_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_sheet_name() -> String {
    "Sheet1".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            apps_script_url: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        // The embedded document is a compile-time constant covered by tests.
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|_| DashboardConfig {
            sheet: SheetConfig {
                id: String::new(),
                name: default_sheet_name(),
                gid: 0,
            },
            transport: TransportConfig::default(),
            output: OutputConfig::default(),
        })
    }
}

impl DashboardConfig {
    /// Apps Script endpoint, `None` when blank or still the placeholder.
    pub fn rpc_url(&self) -> Option<&str> {
        let url = self.transport.apps_script_url.trim();
        if url.is_empty() || url == RPC_PLACEHOLDER {
            None
        } else {
            Some(url)
        }
    }

    pub fn gviz_url(&self) -> String {
        format!(
            "https://docs.google.com/spreadsheets/d/{}/gviz/tq?tqx=out:json&sheet={}",
            self.sheet.id, self.sheet.name
        )
    }

    pub fn csv_url(&self) -> String {
        format!(
            "https://docs.google.com/spreadsheets/d/{}/export?format=csv&gid={}",
            self.sheet.id, self.sheet.gid
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.transport.timeout_secs)
    }
}

/// Load configuration.
///
/// Search order:
/// 1. `explicit` path (from `--config`), which must exist
/// 2. `dashboard.toml` in the working directory
/// 3. `dashboard.toml` next to the executable
/// 4. the embedded default
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<DashboardConfig> {
    if let Some(path) = explicit {
        return read_config(path);
    }

    let mut candidates = vec![PathBuf::from(CONFIG_FILE)];
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.push(exe_dir.join(CONFIG_FILE));
        }
    }
    for path in candidates {
        if path.exists() {
            return read_config(&path);
        }
        tracing::debug!("{} not found", path.display());
    }

    tracing::info!("Using default embedded configuration");
    let config: DashboardConfig = toml::from_str(DEFAULT_CONFIG)?;
    Ok(config)
}

fn read_config(path: &Path) -> anyhow::Result<DashboardConfig> {
    tracing::info!("Loading config from: {}", path.display());
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let config: DashboardConfig =
        toml::from_str(&contents).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn embedded_default_parses() {
        let config: DashboardConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.sheet.name, "Sheet1");
        assert_eq!(config.transport.timeout_secs, 30);
        assert!(config.rpc_url().is_some());
    }

    #[test]
    fn urls_are_built_from_sheet_settings() {
        let config: DashboardConfig =
            toml::from_str("[sheet]\nid = \"abc\"\nname = \"Sales\"\ngid = 7\n").unwrap();
        assert_eq!(
            config.gviz_url(),
            "https://docs.google.com/spreadsheets/d/abc/gviz/tq?tqx=out:json&sheet=Sales"
        );
        assert_eq!(
            config.csv_url(),
            "https://docs.google.com/spreadsheets/d/abc/export?format=csv&gid=7"
        );
        assert_eq!(config.rpc_url(), None);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.output.dir, PathBuf::from("."));
    }

    #[test]
    fn placeholder_rpc_url_is_ignored() {
        let mut config = DashboardConfig::default();
        config.transport.apps_script_url = RPC_PLACEHOLDER.to_string();
        assert_eq!(config.rpc_url(), None);
    }

    #[test]
    fn explicit_config_file_is_used() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sheet]\nid = \"xyz\"\n[transport]\ntimeout_secs = 5").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.sheet.id, "xyz");
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn broken_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sheet\nid = ").unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }
}
