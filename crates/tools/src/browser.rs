use async_trait::async_trait;
use driftbot_core::config::BrowserConfig;
use driftbot_core::{Error, Result};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::web::html_to_markdown;
use crate::{safe_truncate, Tool, ToolContext, ToolSchema};

/// Candidate browser binaries, checked in order when no explicit path is
/// configured.
const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

pub struct BrowseTool;

#[async_trait]
impl Tool for BrowseTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browse",
            description: "Open a URL in a real headless browser, let the page render (including JavaScript), and return the rendered content as Markdown. Slower than web_fetch; use it for dynamic pages.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "URL to open (must be http or https)"
                    },
                    "maxChars": {
                        "type": "integer",
                        "description": "Maximum characters to return (default: 50000)"
                    }
                },
                "required": ["url"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        let url = params
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Validation("Missing required parameter: url".to_string()))?;

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::Validation(
                "URL must start with http:// or https://".to_string(),
            ));
        }

        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        if !ctx.config.browser.enabled {
            return Err(Error::Browser(
                "Browser is disabled in config (browser.enabled = false)".to_string(),
            ));
        }

        let url = params["url"].as_str().unwrap();
        let max_chars = params
            .get("maxChars")
            .and_then(|v| v.as_u64())
            .unwrap_or(50000) as usize;

        let html = dump_rendered_dom(&ctx.config.browser, url).await?;
        let markdown = html_to_markdown(&html)?;
        let text = safe_truncate(&markdown, max_chars);

        Ok(json!({
            "url": url,
            "format": "markdown",
            "truncated": text.len() < markdown.len(),
            "length": text.len(),
            "text": text
        }))
    }
}

/// Find the browser binary: explicit config path first, then PATH lookup.
fn resolve_browser_binary(config: &BrowserConfig) -> Result<String> {
    if let Some(binary) = &config.binary {
        return Ok(binary.clone());
    }
    for candidate in BROWSER_CANDIDATES {
        if let Ok(path) = which::which(candidate) {
            debug!(binary = %path.display(), "Browser binary found on PATH");
            return Ok(path.to_string_lossy().into_owned());
        }
    }
    Err(Error::Browser(
        "No browser binary found. Install chromium or set browser.binary in config".to_string(),
    ))
}

/// Launch the browser headless, navigate, and capture the rendered DOM.
///
/// Uses `--dump-dom` with a virtual time budget so JS-driven pages get a
/// chance to settle before the DOM is serialized.
async fn dump_rendered_dom(config: &BrowserConfig, url: &str) -> Result<String> {
    let binary = resolve_browser_binary(config)?;

    let mut cmd = Command::new(&binary);
    if config.headless {
        cmd.arg("--headless=new");
    }
    if config.no_sandbox {
        cmd.arg("--no-sandbox");
    }
    cmd.arg("--disable-gpu")
        .arg("--disable-dev-shm-usage")
        .arg(format!(
            "--virtual-time-budget={}",
            config.navigation_wait_secs * 1000
        ))
        .arg("--dump-dom")
        .arg(url)
        .kill_on_drop(true);

    info!(binary = %binary, url = %url, "Launching headless browser");

    // Allow some slack beyond the page's own budget for process startup.
    let deadline = Duration::from_secs(config.navigation_wait_secs + 15);
    let output = tokio::time::timeout(deadline, cmd.output())
        .await
        .map_err(|_| {
            Error::Timeout(format!(
                "Browser did not finish within {}s for {}",
                deadline.as_secs(),
                url
            ))
        })?
        .map_err(|e| Error::Browser(format!("Failed to launch browser '{}': {}", binary, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, stderr = %stderr, "Browser exited with error");
        return Err(Error::Browser(format!(
            "Browser exited with {} for {}",
            output.status, url
        )));
    }

    let html = String::from_utf8_lossy(&output.stdout).into_owned();
    if html.trim().is_empty() {
        return Err(Error::Browser(format!("Browser returned empty DOM for {}", url)));
    }

    debug!(html_len = html.len(), "Captured rendered DOM");
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftbot_core::Config;

    #[test]
    fn test_validate_url() {
        let tool = BrowseTool;
        assert!(tool.validate(&json!({"url": "https://example.com"})).is_ok());
        assert!(tool.validate(&json!({"url": "file:///etc/passwd"})).is_err());
        assert!(tool.validate(&json!({})).is_err());
    }

    #[test]
    fn test_resolve_browser_binary_prefers_config() {
        let mut config = BrowserConfig::default();
        config.binary = Some("/opt/custom/chromium".to_string());
        let resolved = resolve_browser_binary(&config).unwrap();
        assert_eq!(resolved, "/opt/custom/chromium");
    }

    #[tokio::test]
    async fn test_execute_disabled_browser_is_error() {
        let mut config = Config::default();
        config.browser.enabled = false;
        let ctx = ToolContext {
            workspace: std::env::temp_dir(),
            config,
        };
        let result = BrowseTool
            .execute(ctx, json!({"url": "https://example.com"}))
            .await;
        assert!(matches!(result, Err(Error::Browser(_))));
    }
}
