//! Pre-flight checklist run by `mnrega-muster --setup`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::config::ScraperConfig;
use crate::scraping::browser_manager;

/// Host and port the portal is served from.
pub const PORTAL_HOST: (&str, u16) = ("mnregaweb4.nic.in", 443);

#[derive(Clone, Debug)]
pub struct SetupOptions {
    pub config: ScraperConfig,
    pub output_dir: PathBuf,
    /// Whether to test that the portal is reachable (off for offline machines and tests).
    pub check_portal: bool,
    pub portal_timeout: Duration,
}

impl SetupOptions {
    pub fn new(config: ScraperConfig, output_dir: PathBuf) -> Self {
        Self {
            config,
            output_dir,
            check_portal: true,
            portal_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skip,
}

impl CheckStatus {
    pub fn is_fail(self) -> bool {
        matches!(self, CheckStatus::Fail)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetupCheck {
    pub id: String,
    pub title: String,
    pub status: CheckStatus,
    pub details: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SetupReport {
    pub checks: Vec<SetupCheck>,
}

impl SetupReport {
    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status.is_fail())
    }

    pub fn summarize_for_logs(&self) -> String {
        let count = |s: CheckStatus| self.checks.iter().filter(|c| c.status == s).count();
        format!(
            "setup: {} pass, {} warn, {} fail, {} skip",
            count(CheckStatus::Pass),
            count(CheckStatus::Warn),
            count(CheckStatus::Fail),
            count(CheckStatus::Skip)
        )
    }

    pub fn print_action_required_blocks(&self) {
        for check in self.checks.iter().filter(|c| !c.actions.is_empty()) {
            warn!("\n=== ACTION REQUIRED: {} ===\n{}\n", check.title, check.details);
            for step in &check.actions {
                eprintln!("  • {}", step);
            }
            eprintln!();
        }
    }
}

impl fmt::Display for SetupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "mnrega-muster Pre-flight Checklist")?;
        writeln!(f, "{}", "=".repeat(34))?;
        for c in &self.checks {
            writeln!(
                f,
                "[{:<4}] {}\n  {}",
                match c.status {
                    CheckStatus::Pass => "OK",
                    CheckStatus::Warn => "WARN",
                    CheckStatus::Fail => "FAIL",
                    CheckStatus::Skip => "SKIP",
                },
                c.title,
                c.details.replace('\n', "\n  ")
            )?;
            for step in &c.actions {
                writeln!(f, "    - {}", step)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

pub async fn check_all(options: &SetupOptions) -> SetupReport {
    let mut report = SetupReport::default();
    report.checks.push(check_browser(&options.config));
    report.checks.push(check_output_dir(&options.output_dir));
    report.checks.push(if options.check_portal {
        check_portal_reachable(options.portal_timeout).await
    } else {
        SetupCheck {
            id: "portal_reachable".to_string(),
            title: "Portal reachability".to_string(),
            status: CheckStatus::Skip,
            details: "Portal reachability check disabled.".to_string(),
            actions: vec![],
        }
    });
    report
}

fn check_browser(config: &ScraperConfig) -> SetupCheck {
    let title = "Browser dependency (Chrome/Chromium)".to_string();
    match browser_manager::resolve_executable(&config.browser) {
        Some(exe) if Path::new(&exe).exists() || which::which(&exe).is_ok() => SetupCheck {
            id: "browser".to_string(),
            title,
            status: CheckStatus::Pass,
            details: format!("Using {}", exe),
            actions: vec![],
        },
        Some(exe) => SetupCheck {
            id: "browser".to_string(),
            title,
            status: CheckStatus::Fail,
            details: format!("Configured browser does not exist: {}", exe),
            actions: vec![
                "Fix `browser.executable` in mnrega-scraper.json or CHROME_EXECUTABLE".to_string(),
            ],
        },
        None => SetupCheck {
            id: "browser".to_string(),
            title,
            status: CheckStatus::Fail,
            details: "No Chrome/Chromium executable found on PATH or in common install locations."
                .to_string(),
            actions: vec![
                "Ubuntu/Debian: `sudo apt-get install -y chromium`".to_string(),
                "Fedora: `sudo dnf install -y chromium`".to_string(),
                "Or point CHROME_EXECUTABLE at an existing browser binary".to_string(),
            ],
        },
    }
}

fn check_output_dir(dir: &Path) -> SetupCheck {
    let title = format!("Output directory ({})", dir.display());
    let fail = |details: String| SetupCheck {
        id: "output_dir".to_string(),
        title: title.clone(),
        status: CheckStatus::Fail,
        details,
        actions: vec![format!("Ensure {} exists and is writable", dir.display())],
    };

    if let Err(e) = std::fs::create_dir_all(dir) {
        return fail(format!("Failed to create {}: {}", dir.display(), e));
    }
    let marker = dir.join(".mnrega_write_test");
    if let Err(e) = std::fs::write(&marker, b"ok") {
        return fail(format!("Directory not writable: {} ({})", dir.display(), e));
    }
    let _ = std::fs::remove_file(&marker);

    SetupCheck {
        id: "output_dir".to_string(),
        title,
        status: CheckStatus::Pass,
        details: format!("Writable: {}", dir.display()),
        actions: vec![],
    }
}

async fn check_portal_reachable(timeout: Duration) -> SetupCheck {
    let (host, port) = PORTAL_HOST;
    let connect = tokio::net::TcpStream::connect((host, port));
    let (status, details) = match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(_)) => (CheckStatus::Pass, format!("TCP connect to {}:{} succeeded.", host, port)),
        Ok(Err(e)) => (CheckStatus::Warn, format!("TCP connect to {}:{} failed: {}", host, port, e)),
        Err(_) => (
            CheckStatus::Warn,
            format!("TCP connect to {}:{} timed out after {}s", host, port, timeout.as_secs()),
        ),
    };
    SetupCheck {
        id: "portal_reachable".to_string(),
        title: "Portal reachability".to_string(),
        status,
        details,
        actions: vec![],
    }
}
