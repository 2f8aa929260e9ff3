//! Web tools: DuckDuckGo HTML search and plain-text page fetching.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{ToolContext, ToolHandler};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const SEARCH_RESULT_LIMIT: usize = 5;
const MAX_PAGE_CHARS: usize = 12_000;

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>").unwrap()
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static RESULT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a[^>]+class="result__a"[^>]+href="([^"]+)"[^>]*>(.*?)</a>"#).unwrap()
});
static RESULT_SNIPPET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a[^>]+class="result__snippet"[^>]*>(.*?)</a>"#).unwrap()
});

#[derive(Deserialize)]
struct SearchArgs {
    #[serde(alias = "q")]
    query: String,
}

#[derive(Deserialize)]
struct VisitArgs {
    url: String,
    #[serde(default)]
    max_bytes: Option<usize>,
}

fn web_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|err| anyhow!("Error building web client: {}", err))
}

pub struct WebSearchHandler;

#[async_trait]
impl ToolHandler for WebSearchHandler {
    fn name(&self) -> &'static str {
        "web_search"
    }

    async fn handle(&self, _ctx: &ToolContext<'_>, args: &Value) -> Result<String> {
        let parsed: SearchArgs = serde_json::from_value(args.clone())
            .map_err(|err| anyhow!("invalid web_search arguments: {}", err))?;

        let client = web_client()?;
        let html = client
            .get("https://html.duckduckgo.com/html/")
            .query(&[("q", parsed.query.as_str())])
            .send()
            .await
            .map_err(|err| anyhow!("Error searching for '{}': {}", parsed.query, err))?
            .error_for_status()
            .map_err(|err| anyhow!("Search request rejected: {}", err))?
            .text()
            .await
            .map_err(|err| anyhow!("Error reading search results: {}", err))?;

        let results = parse_search_results(&html);
        if results.is_empty() {
            return Ok(format!("No results found for '{}'", parsed.query));
        }

        let mut out = format!("Search results for '{}':\n", parsed.query);
        for (idx, result) in results.iter().enumerate() {
            out.push_str(&format!(
                "\n{}. {}\n   {}\n   {}\n",
                idx + 1,
                result.title,
                result.url,
                result.snippet
            ));
        }
        Ok(out)
    }
}

pub struct VisitUrlHandler;

#[async_trait]
impl ToolHandler for VisitUrlHandler {
    fn name(&self) -> &'static str {
        "visit_url"
    }

    async fn handle(&self, _ctx: &ToolContext<'_>, args: &Value) -> Result<String> {
        let parsed: VisitArgs = serde_json::from_value(args.clone())
            .map_err(|err| anyhow!("invalid visit_url arguments: {}", err))?;

        let client = web_client()?;
        let html = client
            .get(&parsed.url)
            .send()
            .await
            .map_err(|err| anyhow!("Error visiting '{}': {}", parsed.url, err))?
            .error_for_status()
            .map_err(|err| anyhow!("Page request rejected: {}", err))?
            .text()
            .await
            .map_err(|err| anyhow!("Error reading page '{}': {}", parsed.url, err))?;

        let mut text = html_to_text(&html);
        let limit = parsed.max_bytes.unwrap_or(MAX_PAGE_CHARS);
        if text.len() > limit {
            let mut cut = limit;
            while cut > 0 && !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("\n... (page truncated)");
        }
        if text.trim().is_empty() {
            return Ok(format!("No readable text at '{}'", parsed.url));
        }
        Ok(text)
    }
}

struct SearchResult {
    title: String,
    url: String,
    snippet: String,
}

fn parse_search_results(html: &str) -> Vec<SearchResult> {
    let mut snippets = RESULT_SNIPPET
        .captures_iter(html)
        .map(|caps| html_to_text(&caps[1]));

    RESULT_LINK
        .captures_iter(html)
        .take(SEARCH_RESULT_LIMIT)
        .map(|caps| SearchResult {
            url: resolve_redirect(&caps[1]),
            title: html_to_text(&caps[2]),
            snippet: snippets.next().unwrap_or_default(),
        })
        .collect()
}

/// DuckDuckGo wraps result links in a redirect; the real target sits in the
/// `uddg` query parameter.
fn resolve_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    if let Ok(url) = url::Url::parse(&absolute) {
        for (key, value) in url.query_pairs() {
            if key == "uddg" {
                return value.into_owned();
            }
        }
    }
    absolute
}

/// Strips markup from an HTML fragment, keeping rough line structure.
pub(crate) fn html_to_text(html: &str) -> String {
    let no_scripts = SCRIPT_STYLE.replace_all(html, "");
    let with_breaks = no_scripts
        .replace("</p>", "\n")
        .replace("</div>", "\n")
        .replace("</li>", "\n")
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n");
    let stripped = TAG.replace_all(&with_breaks, " ");
    let decoded = stripped
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    let cleaned = decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n");
    BLANK_LINES.replace_all(&cleaned, "\n\n").trim().to_string()
}
