use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ScraperConfig: file-based config loader (mnrega-scraper.json) with env-var fallback
// ---------------------------------------------------------------------------

/// Browser process settings (the `browser` key in mnrega-scraper.json).
#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct BrowserSettings {
    /// Explicit browser binary. Falls back to `CHROME_EXECUTABLE`, then auto-discovery.
    pub executable: Option<String>,
    /// Run without a visible window. Defaults to `true`.
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Fixed user agent. When absent a realistic desktop agent is drawn at random.
    pub user_agent: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            window_width: 1400,
            window_height: 900,
            user_agent: None,
        }
    }
}

impl BrowserSettings {
    /// Executable: JSON field → `CHROME_EXECUTABLE` env var → `None` (auto-discover).
    pub fn resolve_executable(&self) -> Option<String> {
        if let Some(exe) = &self.executable {
            if !exe.trim().is_empty() {
                return Some(exe.trim().to_string());
            }
        }
        chrome_executable_override()
    }

    /// Headless flag: `MNREGA_HEADLESS=0` forces a visible browser, otherwise the JSON field.
    pub fn resolve_headless(&self) -> bool {
        match std::env::var(ENV_HEADLESS) {
            Ok(v) => !matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            ),
            Err(_) => self.headless,
        }
    }
}

/// Every wait and pause the navigation workflow uses, in milliseconds.
///
/// Waits are terminal: exceeding one fails the run. The only retried step is
/// dropdown selection (`select_attempts` tries, `select_retry_delay_ms` apart).
#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct FlowTimings {
    /// Budget for page elements on the search, results and asset register pages.
    pub wait_timeout_ms: u64,
    /// Budget for a newly spawned window to show up.
    pub window_timeout_ms: u64,
    /// Budget for the muster detail section to render.
    pub extract_timeout_ms: u64,
    /// Pause after a dropdown change that re-renders the controls below it.
    pub settle_delay_ms: u64,
    /// Pause after opening a muster roll, before checking for a new window.
    pub popup_grace_ms: u64,
    pub select_attempts: u32,
    pub select_retry_delay_ms: u64,
    /// How often waits re-check their condition.
    pub poll_interval_ms: u64,
}

impl Default for FlowTimings {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 40_000,
            window_timeout_ms: 30_000,
            extract_timeout_ms: 30_000,
            settle_delay_ms: 2_000,
            popup_grace_ms: 2_000,
            select_attempts: 5,
            select_retry_delay_ms: 1_000,
            poll_interval_ms: 250,
        }
    }
}

impl FlowTimings {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn window_timeout(&self) -> Duration {
        Duration::from_millis(self.window_timeout_ms)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_millis(self.extract_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn popup_grace(&self) -> Duration {
        Duration::from_millis(self.popup_grace_ms)
    }

    pub fn select_retry_delay(&self) -> Duration {
        Duration::from_millis(self.select_retry_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Top-level config loaded from `mnrega-scraper.json`.
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default)]
pub struct ScraperConfig {
    pub browser: BrowserSettings,
    pub timings: FlowTimings,
    /// Where spreadsheets are written. Defaults to the current directory.
    pub output_dir: Option<PathBuf>,
}

impl ScraperConfig {
    /// Output directory: `MNREGA_OUTPUT_DIR` env var → JSON field → `.`.
    pub fn resolve_output_dir(&self) -> PathBuf {
        if let Ok(v) = std::env::var(ENV_OUTPUT_DIR) {
            if !v.trim().is_empty() {
                return PathBuf::from(v.trim());
            }
        }
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Load `mnrega-scraper.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `MNREGA_SCRAPER_CONFIG` env var path
/// 2. `./mnrega-scraper.json`
/// 3. `~/.mnrega-scraper/config.json`
///
/// Missing file → `ScraperConfig::default()`.
/// Parse error → log a warning, return `ScraperConfig::default()`.
pub fn load_scraper_config() -> ScraperConfig {
    let mut candidates: Vec<PathBuf> = vec![PathBuf::from("mnrega-scraper.json")];
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".mnrega-scraper").join("config.json"));
    }

    for path in &candidates {
        if let Some(cfg) = load_config_file(path) {
            return cfg;
        }
    }

    ScraperConfig::default()
}

/// `None` when the file is absent; defaults (with a warning) when it is malformed.
fn load_config_file(path: &Path) -> Option<ScraperConfig> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<ScraperConfig>(&contents) {
        Ok(cfg) => {
            tracing::info!("mnrega-scraper config loaded from {}", path.display());
            Some(cfg)
        }
        Err(e) => {
            tracing::warn!(
                "mnrega-scraper config parse error at {}: {}; using defaults",
                path.display(),
                e
            );
            Some(ScraperConfig::default())
        }
    }
}

// ---------------------------------------------------------------------------

pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_CONFIG_PATH: &str = "MNREGA_SCRAPER_CONFIG";
pub const ENV_HEADLESS: &str = "MNREGA_HEADLESS";
pub const ENV_OUTPUT_DIR: &str = "MNREGA_OUTPUT_DIR";

/// Optional override for the Chromium-family browser executable.
///
/// Only returns a value when `CHROME_EXECUTABLE` is set to an existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}
