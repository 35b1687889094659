//! Locating generated test reports and inlining their stylesheets.

use onboard_html::{inline_stylesheet, join_stylesheets};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{OnboardError, Result};

/// Body returned when a successful run left no report behind.
pub const REPORT_PLACEHOLDER: &str = "JUnit report not found.";

/// Stylesheets inlined into the report, in order, relative to the report directory.
const STYLESHEETS: [&str; 2] = ["css/base-style.css", "css/style.css"];

/// Where the build tool writes its HTML test report.
#[derive(Debug, Clone)]
pub struct ReportLocation {
    pub dir: PathBuf,
    /// Upper bound on how long to wait for `index.html` to appear.
    pub wait: Duration,
    pub poll: Duration,
}

impl ReportLocation {
    pub fn index(&self) -> PathBuf {
        self.dir.join("index.html")
    }
}

/// Wait for the report to appear, then return it with its stylesheets inlined.
///
/// `Ok(None)` means no report appeared within the wait budget.
pub async fn assemble_report(location: &ReportLocation) -> Result<Option<String>> {
    let index = location.index();
    if !wait_for_file(&index, location.wait, location.poll).await {
        debug!(path = %index.display(), "report did not appear");
        return Ok(None);
    }

    let html = tokio::fs::read_to_string(&index).await.map_err(|e| {
        OnboardError::internal(format!("reading report {}: {e}", index.display()))
    })?;

    let mut sheets = Vec::with_capacity(STYLESHEETS.len());
    for relative in STYLESHEETS {
        let path = location.dir.join(relative);
        match tokio::fs::read_to_string(&path).await {
            Ok(css) => sheets.push(css),
            Err(e) => warn!(path = %path.display(), error = %e, "stylesheet not inlined"),
        }
    }

    if sheets.is_empty() {
        return Ok(Some(html));
    }
    Ok(Some(inline_stylesheet(&html, &join_stylesheets(&sheets))))
}

/// Poll for `path` until it exists or `wait` elapses. Checks at least once.
async fn wait_for_file(path: &Path, wait: Duration, poll: Duration) -> bool {
    let deadline = Instant::now() + wait;
    loop {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}
