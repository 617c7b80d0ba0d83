use async_trait::async_trait;
use driftbot_core::{Error, Result};
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::{safe_truncate, Tool, ToolContext, ToolSchema};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

// ============ web_search ============

pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "web_search",
            description: "Search the web and return a list of results with title, url and snippet. Use this to discover pages before fetching or browsing them.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    },
                    "count": {
                        "type": "integer",
                        "description": "Number of results (1-10, default 5)"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if params.get("query").and_then(|v| v.as_str()).is_none() {
            return Err(Error::Validation(
                "Missing required parameter: query".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, _ctx: ToolContext, params: Value) -> Result<Value> {
        let query = params["query"].as_str().unwrap();
        let count = params
            .get("count")
            .and_then(|v| v.as_u64())
            .unwrap_or(5)
            .min(10) as usize;

        let results = duckduckgo_search(query, count).await?;
        Ok(json!({ "query": query, "results": results, "source": "duckduckgo" }))
    }
}

/// DuckDuckGo HTML endpoint scraper. No API key needed and the non-JS
/// page has a stable DOM.
async fn duckduckgo_search(query: &str, count: usize) -> Result<Vec<Value>> {
    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|e| Error::Tool(format!("Failed to create HTTP client: {}", e)))?;

    let response = client
        .get("https://html.duckduckgo.com/html/")
        .query(&[("q", query)])
        .header("User-Agent", BROWSER_USER_AGENT)
        .header("Accept", "text/html,application/xhtml+xml,*/*;q=0.8")
        .send()
        .await
        .map_err(|e| Error::Tool(format!("Search request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(Error::Tool(format!(
            "Search returned status {}",
            response.status()
        )));
    }

    let html = response
        .text()
        .await
        .map_err(|e| Error::Tool(format!("Failed to read search response: {}", e)))?;

    let results = parse_duckduckgo_results(&html, count);
    debug!(count = results.len(), query, "Search results");
    Ok(results)
}

fn parse_duckduckgo_results(html: &str, count: usize) -> Vec<Value> {
    let document = Html::parse_document(html);
    let result_sel = Selector::parse("div.result").unwrap();
    let title_sel = Selector::parse("a.result__a").unwrap();
    let snippet_sel = Selector::parse("a.result__snippet, .result__snippet").unwrap();

    let mut results = Vec::new();
    for el in document.select(&result_sel) {
        if results.len() >= count {
            break;
        }

        let title_el = match el.select(&title_sel).next() {
            Some(e) => e,
            None => continue,
        };
        let title = title_el.text().collect::<Vec<_>>().join("").trim().to_string();
        let href = title_el.value().attr("href").unwrap_or("").to_string();
        if title.is_empty() || href.is_empty() {
            continue;
        }

        let url = match resolve_redirect_url(&href) {
            Some(u) => u,
            None => continue,
        };

        let snippet = el
            .select(&snippet_sel)
            .next()
            .map(|e| e.text().collect::<Vec<_>>().join("").trim().to_string())
            .unwrap_or_default();

        results.push(json!({ "title": title, "url": url, "snippet": snippet }));
    }
    results
}

/// Result links come back as `//duckduckgo.com/l/?uddg=<encoded>&...`.
/// Extract and decode the target URL.
fn resolve_redirect_url(href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let query = href.split('?').nth(1)?;
    for pair in query.split('&') {
        if let Some(encoded) = pair.strip_prefix("uddg=") {
            let decoded = urlencoding::decode(encoded).ok()?;
            if decoded.starts_with("http") {
                return Some(decoded.into_owned());
            }
        }
    }
    None
}

// ============ web_fetch ============

pub struct WebFetchTool;

#[async_trait]
impl Tool for WebFetchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "web_fetch",
            description: "Fetch a web page over plain HTTP and return its content as clean Markdown. Fast, but does not run JavaScript; use the browse tool for pages that need a real browser.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "URL to fetch (must be http or https)"
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

    async fn execute(&self, _ctx: ToolContext, params: Value) -> Result<Value> {
        let url = params["url"].as_str().unwrap();
        let max_chars = params
            .get("maxChars")
            .and_then(|v| v.as_u64())
            .unwrap_or(50000) as usize;

        fetch_markdown(url, max_chars).await
    }
}

async fn fetch_markdown(url: &str, max_chars: usize) -> Result<Value> {
    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::limited(10))
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| Error::Tool(format!("Failed to create HTTP client: {}", e)))?;

    let response = client
        .get(url)
        .header("User-Agent", BROWSER_USER_AGENT)
        .header("Accept", "text/html,application/xhtml+xml,*/*;q=0.8")
        .send()
        .await
        .map_err(|e| Error::Tool(format!("Fetch failed: {}", e)))?;

    let status = response.status().as_u16();
    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = response
        .text()
        .await
        .map_err(|e| Error::Tool(format!("Failed to read response body: {}", e)))?;

    let markdown = if content_type.contains("text/html") {
        html_to_markdown(&body)?
    } else {
        body
    };

    let text = safe_truncate(&markdown, max_chars);
    let truncated = text.len() < markdown.len();

    Ok(json!({
        "url": url,
        "finalUrl": final_url,
        "status": status,
        "format": "markdown",
        "truncated": truncated,
        "length": text.len(),
        "text": text
    }))
}

/// Convert an HTML document to Markdown, dropping script/style noise.
pub fn html_to_markdown(html: &str) -> Result<String> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "noscript", "iframe", "svg"])
        .build();
    converter
        .convert(html)
        .map_err(|e| Error::Tool(format!("HTML to markdown conversion failed: {}", e)))
}
