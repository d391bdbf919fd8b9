//! Crawler (§4.4): breadth-first, politeness-constrained URL discovery.

use std::collections::{HashSet, VecDeque};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;
use webscan_core::{WebscanError, WebscanResult};
use webscan_net::canonicalise;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub max_depth: u32,
    pub max_pages: usize,
    pub rate_limit_ms: u64,
    pub respect_robots_txt: bool,
    pub allow_external_links: bool,
    pub timeout_ms: u64,
    /// Extra headers (e.g. `Cookie`) merged into every request, typically
    /// populated by the Authentication Engine's captured session.
    pub session_credentials: Vec<(String, String)>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        CrawlerConfig {
            max_depth: 2,
            max_pages: 50,
            rate_limit_ms: 1000,
            respect_robots_txt: true,
            allow_external_links: false,
            timeout_ms: 10_000,
            session_credentials: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredForm {
    pub page_url: String,
    pub method: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct CrawlMetadata {
    pub pages_scanned: usize,
    pub total_requests: usize,
    pub total_bytes: usize,
    pub avg_response_time_ms: f64,
    pub duration_ms: u128,
    pub max_depth_reached: u32,
    pub robots_txt_respected: bool,
    pub skipped_by_robots: usize,
    pub failed_requests: usize,
    pub unique_endpoints: usize,
    pub forms_discovered: usize,
    pub crawl_speed: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlOutput {
    pub urls: Vec<String>,
    pub endpoints: Vec<String>,
    pub forms: Vec<DiscoveredForm>,
    pub errors: Vec<String>,
    pub metadata: CrawlMetadata,
}

static WINDOW_LOCATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"window\.location\s*=\s*["']([^"']+)["']"#).unwrap());
static ROUTER_PUSH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"router\.push\(\s*["']([^"']+)["']"#).unwrap());
static ROUTER_NAVIGATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"router\.navigate\(\s*["']([^"']+)["']"#).unwrap());
static HREF_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href:\s*["']([^"']+)["']"#).unwrap());

static API_PATH_LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["'](/api/[^"']*)["']"#).unwrap());
static FETCH_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"fetch\(\s*["']([^"']+)["']"#).unwrap());
static AXIOS_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"axios\.(?:get|post|put|patch|delete)\(\s*["']([^"']+)["']"#).unwrap()
});
static AJAX_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\$\.ajax\(\s*\{\s*url:\s*["']([^"']+)["']"#).unwrap());

/// Crawls from `seed_url`, returning discovered URLs, endpoints, and forms.
/// Fails only if the seed URL itself cannot be fetched at all (§4.4 Failure
/// semantics); every other fetch error is recorded in `errors` and does not
/// abort the crawl.
pub async fn crawl(seed_url: &str, config: &CrawlerConfig) -> WebscanResult<CrawlOutput> {
    tracing::info!(seed_url, max_depth = config.max_depth, max_pages = config.max_pages, "starting crawl");
    let started = Instant::now();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.timeout_ms))
        .build()
        .map_err(|e| WebscanError::Fetch(e.to_string()))?;

    let seed = Url::parse(seed_url).map_err(|e| WebscanError::Normalisation(e.to_string()))?;
    let origin = format!(
        "{}://{}",
        seed.scheme(),
        seed.host_str().unwrap_or_default()
    );

    let disallow = if config.respect_robots_txt {
        fetch_robots_disallow(&client, &origin).await
    } else {
        Vec::new()
    };

    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(String, u32)> = VecDeque::new();

    for loc in fetch_sitemap_locs(&client, &origin).await {
        queue.push_back((canonicalise(&loc), 0));
    }
    queue.push_back((canonicalise(seed.as_str()), 0));

    let mut urls = Vec::new();
    let mut endpoints: HashSet<String> = HashSet::new();
    let mut forms = Vec::new();
    let mut errors = Vec::new();

    let mut metadata = CrawlMetadata {
        robots_txt_respected: config.respect_robots_txt,
        ..Default::default()
    };
    let mut total_response_time_ms: u128 = 0;
    let mut first_fetch = true;
    let mut seed_fetched_ok = false;

    while let Some((url, depth)) = queue.pop_front() {
        if visited.len() >= config.max_pages {
            break;
        }
        if visited.contains(&url) {
            continue;
        }
        if depth > config.max_depth {
            continue;
        }
        let parsed = match Url::parse(&url) {
            Ok(p) => p,
            Err(_) => continue,
        };
        if !config.allow_external_links && parsed.host_str() != seed.host_str() {
            continue;
        }
        if config.respect_robots_txt && matches_disallow(parsed.path(), &disallow) {
            metadata.skipped_by_robots += 1;
            continue;
        }

        if !first_fetch {
            tokio::time::sleep(Duration::from_millis(config.rate_limit_ms)).await;
        }
        first_fetch = false;

        visited.insert(url.clone());
        metadata.pages_scanned += 1;
        metadata.total_requests += 1;
        metadata.max_depth_reached = metadata.max_depth_reached.max(depth);

        let fetch_started = Instant::now();
        let mut request = client.get(&url);
        for (name, value) in &config.session_credentials {
            request = request.header(name, value);
        }
        let response = request.send().await;
        total_response_time_ms += fetch_started.elapsed().as_millis();

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                errors.push(format!("{url}: {e}"));
                metadata.failed_requests += 1;
                if url == canonicalise(seed.as_str()) {
                    tracing::error!(seed_url, error = %e, "seed URL unreachable, aborting crawl");
                    return Err(WebscanError::OrchestratorFatal(format!(
                        "seed URL unreachable: {e}"
                    )));
                }
                continue;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            errors.push(format!("{url}: HTTP {status}"));
            metadata.failed_requests += 1;
            if url == canonicalise(seed.as_str()) {
                tracing::error!(seed_url, %status, "seed URL unfetchable, aborting crawl");
                return Err(WebscanError::OrchestratorFatal(format!(
                    "seed URL unfetchable: HTTP {status}"
                )));
            }
            continue;
        }
        if url == canonicalise(seed.as_str()) {
            seed_fetched_ok = true;
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false);
        if !is_html {
            continue;
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                errors.push(format!("{url}: {e}"));
                continue;
            }
        };
        metadata.total_bytes += body.len();

        urls.push(url.clone());
        let extracted = extract(&body, &url);
        for form in extracted.forms {
            forms.push(form);
        }
        for ep in extracted.endpoints {
            endpoints.insert(ep);
        }
        for link in extracted.links {
            let canon = canonicalise(&link);
            if !visited.contains(&canon) {
                queue.push_back((canon, depth + 1));
            }
        }
    }

    if !seed_fetched_ok && urls.is_empty() && errors.is_empty() {
        return Err(WebscanError::OrchestratorFatal(
            "seed URL produced no crawlable content".into(),
        ));
    }

    metadata.duration_ms = started.elapsed().as_millis();
    metadata.avg_response_time_ms = if metadata.total_requests > 0 {
        total_response_time_ms as f64 / metadata.total_requests as f64
    } else {
        0.0
    };
    metadata.unique_endpoints = endpoints.len();
    metadata.forms_discovered = forms.len();
    metadata.crawl_speed = if metadata.duration_ms > 0 {
        metadata.pages_scanned as f64 / (metadata.duration_ms as f64 / 1000.0)
    } else {
        metadata.pages_scanned as f64
    };

    tracing::info!(
        pages_scanned = metadata.pages_scanned,
        forms_discovered = metadata.forms_discovered,
        unique_endpoints = metadata.unique_endpoints,
        "crawl finished"
    );

    Ok(CrawlOutput {
        urls,
        endpoints: endpoints.into_iter().collect(),
        forms,
        errors,
        metadata,
    })
}

struct Extracted {
    links: Vec<String>,
    endpoints: Vec<String>,
    forms: Vec<DiscoveredForm>,
}

fn extract(body: &str, page_url: &str) -> Extracted {
    let document = Html::parse_document(body);
    let base = Url::parse(page_url).ok();

    let mut links = Vec::new();
    for (selector_str, attr) in [
        ("a[href]", "href"),
        ("link[href]", "href"),
        ("script[src]", "src"),
        ("img[src]", "src"),
        ("form[action]", "action"),
        ("iframe[src]", "src"),
    ] {
        if let Ok(selector) = Selector::parse(selector_str) {
            for el in document.select(&selector) {
                if let Some(value) = el.value().attr(attr) {
                    if let Some(abs) = resolve(base.as_ref(), value) {
                        links.push(abs);
                    }
                }
            }
        }
    }

    let mut endpoints = Vec::new();
    let mut forms = Vec::new();

    if let Ok(script_selector) = Selector::parse("script:not([src])") {
        for script in document.select(&script_selector) {
            let text = script.text().collect::<String>();
            for re in [&*WINDOW_LOCATION_RE, &*ROUTER_PUSH_RE, &*ROUTER_NAVIGATE_RE, &*HREF_OBJECT_RE] {
                for cap in re.captures_iter(&text) {
                    if let Some(abs) = resolve(base.as_ref(), &cap[1]) {
                        links.push(abs);
                    }
                }
            }
            for re in [&*API_PATH_LITERAL_RE, &*FETCH_CALL_RE, &*AXIOS_CALL_RE, &*AJAX_CALL_RE] {
                for cap in re.captures_iter(&text) {
                    endpoints.push(cap[1].to_string());
                }
            }
        }
    }

    if let Ok(form_selector) = Selector::parse("form") {
        for form in document.select(&form_selector) {
            let method = form
                .value()
                .attr("method")
                .unwrap_or("GET")
                .to_uppercase();
            let action = form
                .value()
                .attr("action")
                .and_then(|a| resolve(base.as_ref(), a))
                .unwrap_or_else(|| page_url.to_string());
            forms.push(DiscoveredForm {
                page_url: page_url.to_string(),
                method,
                action,
            });
        }
    }

    Extracted {
        links,
        endpoints,
        forms,
    }
}

fn resolve(base: Option<&Url>, candidate: &str) -> Option<String> {
    if candidate.starts_with("javascript:") || candidate.starts_with('#') {
        return None;
    }
    match base {
        Some(b) => b.join(candidate).ok().map(|u| u.to_string()),
        None => Url::parse(candidate).ok().map(|u| u.to_string()),
    }
}

async fn fetch_robots_disallow(client: &reqwest::Client, origin: &str) -> Vec<String> {
    let url = format!("{origin}/robots.txt");
    let body = match client.get(&url).send().await {
        Ok(r) if r.status().is_success() => r.text().await.unwrap_or_default(),
        _ => return Vec::new(),
    };
    parse_robots_disallow(&body)
}

/// Parses the `User-agent: *` block's `Disallow` directives using simple
/// prefix semantics. Other UA blocks and `Allow` overrides are ignored
/// (§9 Open Question, resolved — see DESIGN.md).
fn parse_robots_disallow(body: &str) -> Vec<String> {
    let mut disallow = Vec::new();
    let mut in_wildcard_block = false;
    for line in body.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        match key.as_str() {
            "user-agent" => in_wildcard_block = value == "*",
            "disallow" if in_wildcard_block && !value.is_empty() => {
                disallow.push(value.to_string())
            }
            _ => {}
        }
    }
    disallow
}

fn matches_disallow(path: &str, disallow: &[String]) -> bool {
    disallow.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

async fn fetch_sitemap_locs(client: &reqwest::Client, origin: &str) -> Vec<String> {
    let url = format!("{origin}/sitemap.xml");
    let body = match client.get(&url).send().await {
        Ok(r) if r.status().is_success() => r.text().await.unwrap_or_default(),
        _ => return Vec::new(),
    };
    parse_sitemap_locs(&body)
}

fn parse_sitemap_locs(xml: &str) -> Vec<String> {
    static LOC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<loc>\s*([^<]+)\s*</loc>").unwrap());
    LOC_RE
        .captures_iter(xml)
        .map(|c| c[1].trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn robots_parses_only_wildcard_block() {
        let body = "User-agent: Googlebot\nDisallow: /private\n\nUser-agent: *\nDisallow: /admin\nDisallow: /internal\n";
        let disallow = parse_robots_disallow(body);
        assert_eq!(disallow, vec!["/admin".to_string(), "/internal".to_string()]);
    }

    #[test]
    fn robots_ignores_comments_and_blank_lines() {
        let body = "# a comment\nUser-agent: *\n# another\nDisallow: /x\n\n";
        assert_eq!(parse_robots_disallow(body), vec!["/x".to_string()]);
    }

    #[test]
    fn disallow_prefix_matching() {
        let disallow = vec!["/admin".to_string()];
        assert!(matches_disallow("/admin/users", &disallow));
        assert!(!matches_disallow("/public", &disallow));
    }

    #[test]
    fn sitemap_extracts_locs() {
        let xml = r#"<urlset><url><loc>https://h/a</loc></url><url><loc>https://h/b</loc></url></urlset>"#;
        assert_eq!(
            parse_sitemap_locs(xml),
            vec!["https://h/a".to_string(), "https://h/b".to_string()]
        );
    }

    #[test]
    fn extract_finds_links_forms_and_endpoints() {
        let body = r#"
            <html><body>
              <a href="/page2">next</a>
              <form method="post" action="/submit"></form>
              <script>
                fetch('/api/users');
                var x = "/api/orders";
              </script>
            </body></html>
        "#;
        let extracted = extract(body, "https://h/");
        assert!(extracted.links.iter().any(|l| l.ends_with("/page2")));
        assert_eq!(extracted.forms.len(), 1);
        assert_eq!(extracted.forms[0].method, "POST");
        assert!(extracted.endpoints.iter().any(|e| e == "/api/users"));
        assert!(extracted.endpoints.iter().any(|e| e == "/api/orders"));
    }

    #[tokio::test]
    async fn crawl_follows_links_and_honours_robots_disallow() {
        let mut server = mockito::Server::new_async().await;
        let _robots = server
            .mock("GET", "/robots.txt")
            .with_status(200)
            .with_body("User-agent: *\nDisallow: /skip\n")
            .create_async()
            .await;
        let _sitemap = server.mock("GET", "/sitemap.xml").with_status(404).create_async().await;
        let _root = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(r#"<html><body><a href="/page2">next</a><a href="/skip">nope</a></body></html>"#)
            .create_async()
            .await;
        let _page2 = server
            .mock("GET", "/page2")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html><body>leaf page</body></html>")
            .create_async()
            .await;
        let _skip = server.mock("GET", "/skip").expect(0).create_async().await;

        let config = CrawlerConfig { rate_limit_ms: 0, ..Default::default() };
        let output = crawl(&server.url(), &config).await.unwrap();

        assert!(output.urls.iter().any(|u| u.ends_with("/page2")));
        assert!(!output.urls.iter().any(|u| u.ends_with("/skip")));
        assert_eq!(output.metadata.skipped_by_robots, 1);
        _skip.assert_async().await;
    }

    #[tokio::test]
    async fn crawl_fails_when_the_seed_itself_is_unreachable() {
        let mut server = mockito::Server::new_async().await;
        let _robots = server.mock("GET", "/robots.txt").with_status(404).create_async().await;
        let _sitemap = server.mock("GET", "/sitemap.xml").with_status(404).create_async().await;
        let _root = server.mock("GET", "/").with_status(500).create_async().await;

        let config = CrawlerConfig { rate_limit_ms: 0, ..Default::default() };
        let err = crawl(&server.url(), &config).await.unwrap_err();
        assert!(matches!(err, WebscanError::OrchestratorFatal(_)));
    }
}
