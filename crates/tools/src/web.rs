//! Web-facing tools: Brave search and plain HTTP fetch.

use serde_json::Value;

use crate::{Tool, ToolContext};

const FETCH_MAX_CHARS: usize = 50_000;
const SEARCH_RESULT_LIMIT: usize = 8;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// search
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SearchTool {
    api_key: Option<String>,
    client: reqwest::Client,
}

impl SearchTool {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the web and return the top results with titles, URLs, and snippets."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> String {
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
        if query.is_empty() {
            return "Error: query is required".into();
        }
        let api_key = match &self.api_key {
            Some(k) => k,
            None => return "Error: search API key is not configured".into(),
        };

        let resp = self
            .client
            .get("https://api.search.brave.com/res/v1/web/search")
            .query(&[("q", query), ("count", "10")])
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => return format!("Error: search request failed: {e}"),
        };
        if !resp.status().is_success() {
            return format!("Error: search API returned HTTP {}", resp.status().as_u16());
        }
        let body: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => return format!("Error: invalid search response: {e}"),
        };

        let tag_re = regex::Regex::new(r"<[^>]+>").unwrap();
        let results = body
            .pointer("/web/results")
            .and_then(|r| r.as_array())
            .map(|a| a.as_slice())
            .unwrap_or(&[]);

        if results.is_empty() {
            return format!("No results for '{query}'");
        }

        let mut lines = Vec::new();
        for item in results.iter().take(SEARCH_RESULT_LIMIT) {
            let title = item.get("title").and_then(|v| v.as_str()).unwrap_or("");
            let url = item.get("url").and_then(|v| v.as_str()).unwrap_or("");
            let description = item
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            lines.push(format!(
                "{title}\n{url}\n{}",
                tag_re.replace_all(description, "")
            ));
        }
        lines.join("\n\n")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// http_fetch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HttpFetchTool {
    client: reqwest::Client,
}

impl Default for HttpFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for HttpFetchTool {
    fn name(&self) -> &str {
        "http_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL over HTTP GET and return its body as text."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "URL to fetch" }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> String {
        let url = args.get("url").and_then(|v| v.as_str()).unwrap_or("");
        if url.is_empty() {
            return serde_json::json!({"url": "", "error": "url is required"}).to_string();
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return serde_json::json!({
                "url": url,
                "error": "only http and https URLs are supported",
            })
            .to_string();
        }

        match self.client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                match resp.text().await {
                    Ok(mut content) => {
                        let truncated = content.len() > FETCH_MAX_CHARS;
                        if truncated {
                            let mut end = FETCH_MAX_CHARS;
                            while !content.is_char_boundary(end) {
                                end -= 1;
                            }
                            content.truncate(end);
                        }
                        serde_json::json!({
                            "url": url,
                            "status": status,
                            "content": content,
                            "truncated": truncated,
                        })
                        .to_string()
                    }
                    Err(e) => serde_json::json!({
                        "url": url,
                        "error": format!("failed to read body: {e}"),
                    })
                    .to_string(),
                }
            }
            Err(e) => serde_json::json!({
                "url": url,
                "error": e.to_string(),
            })
            .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify_result;

    #[tokio::test]
    async fn search_without_key_is_error() {
        let tool = SearchTool::new(None);
        let out = tool
            .execute(&serde_json::json!({"query": "rust"}), &ToolContext::default())
            .await;
        assert!(out.starts_with("Error: search API key"));
        let (ok, _) = classify_result("search", &out);
        assert!(!ok);
    }

    #[tokio::test]
    async fn fetch_rejects_non_http_scheme() {
        let tool = HttpFetchTool::new();
        let out = tool
            .execute(
                &serde_json::json!({"url": "file:///etc/passwd"}),
                &ToolContext::default(),
            )
            .await;
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("http"));
        let (ok, _) = classify_result("http_fetch", &out);
        assert!(!ok);
    }

    #[tokio::test]
    async fn fetch_missing_url_is_error() {
        let tool = HttpFetchTool::new();
        let out = tool.execute(&serde_json::json!({}), &ToolContext::default()).await;
        let (ok, err) = classify_result("http_fetch", &out);
        assert!(!ok);
        assert_eq!(err, "url is required");
    }
}
