use reqwest::{Client, Proxy};
use std::time::Duration;
use tracing::{info, warn};

/// Build a reqwest client for an LLM backend.
///
/// `proxy` comes from `providers.<name>.proxy`: `None` follows the
/// HTTPS_PROXY/HTTP_PROXY environment (reqwest default), `Some("")` forces a
/// direct connection, `Some(url)` routes through that proxy.
pub fn build_http_client(proxy: Option<&str>, api_base: &str, timeout: Duration) -> Client {
    let mut builder = Client::builder().timeout(timeout);

    match proxy {
        Some("") => {
            info!(api_base = %api_base, "LLM provider forced to direct connect (proxy disabled)");
            builder = builder.no_proxy();
        }
        Some(url) => match Proxy::all(url) {
            Ok(p) => {
                info!(proxy = %url, api_base = %api_base, "LLM provider using proxy");
                builder = builder.proxy(p);
            }
            Err(e) => {
                warn!(error = %e, proxy = %url, "Invalid proxy URL, falling back to direct connect");
            }
        },
        None => {}
    }

    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build HTTP client, using default");
        Client::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_without_proxy() {
        let client = build_http_client(None, "http://localhost:11434", Duration::from_secs(30));
        drop(client);
    }

    #[test]
    fn test_build_force_direct() {
        let client = build_http_client(Some(""), "https://api.openai.com/v1", Duration::from_secs(30));
        drop(client);
    }

    #[test]
    fn test_build_invalid_proxy_does_not_panic() {
        let client = build_http_client(Some("not a url"), "https://api.openai.com/v1", Duration::from_secs(30));
        drop(client);
    }
}
