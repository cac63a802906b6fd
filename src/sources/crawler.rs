use anyhow::{Context, Result};
use chrono::Datelike;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::SourceAdapter;
use crate::network::get_with_retry;
use crate::normalize::strip_escape_residue;
use crate::ratelimit::Cancelled;

/// Crawls the replay pages of a Wayback-style web archive.
///
/// Starts from `{base_url}/{year}/{name}`, follows links that stay on the
/// archive host and mention the root domain, and scrapes every string matching
/// the subdomain pattern of the root domain.
#[derive(Clone)]
pub struct ArchiveCrawler {
    client: Client,
    retries: u32,
    max_pages: usize,
}

impl ArchiveCrawler {
    pub fn new(client: Client, retries: u32, max_pages: usize) -> Self {
        ArchiveCrawler {
            client,
            retries,
            max_pages: max_pages.max(1),
        }
    }

    fn start_url(base_url: &str, name: &str) -> String {
        let year = chrono::Utc::now().year();
        format!("{}/{}/{}", base_url.trim_end_matches('/'), year, name)
    }

    async fn crawl(
        &self,
        cancel: &CancellationToken,
        base_url: &str,
        source_domain: &str,
        name: &str,
        domain: &str,
    ) -> Result<Vec<String>> {
        let pattern = subdomain_pattern(domain)?;
        let start = Self::start_url(base_url, name);

        let mut queue = VecDeque::from([start.clone()]);
        let mut visited = HashSet::new();
        let mut seen = HashSet::new();
        let mut names = Vec::new();

        while let Some(page) = queue.pop_front() {
            if visited.len() >= self.max_pages {
                break;
            }
            if !visited.insert(page.clone()) {
                continue;
            }

            tracing::debug!(page = %page, "crawling archive page");
            let body = match get_with_retry(&self.client, &page, self.retries, cancel).await {
                Ok(body) => body,
                Err(e) if e.is::<Cancelled>() => return Err(e),
                Err(e) if page == start => {
                    return Err(e).with_context(|| format!("Failed to fetch {}", page));
                }
                Err(e) => {
                    tracing::debug!(page = %page, error = %e, "skipping archive page");
                    continue;
                }
            };

            for found in scrape_names(&pattern, &body) {
                if seen.insert(found.to_string()) {
                    names.push(found.to_string());
                }
            }

            for link in follow_links(&page, &body, source_domain, domain) {
                if !visited.contains(&link) {
                    queue.push_back(link);
                }
            }
        }

        Ok(names)
    }
}

impl SourceAdapter for ArchiveCrawler {
    fn query<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        base_url: &'a str,
        source_domain: &'a str,
        name: &'a str,
        domain: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
        Box::pin(self.crawl(cancel, base_url, source_domain, name, domain))
    }
}

/// Matches `domain` and any of its subdomains inside arbitrary text
pub fn subdomain_pattern(domain: &str) -> Result<Regex> {
    let pattern = format!(
        r"(?i)(?:(?:[a-z0-9]|[_a-z0-9][_a-z0-9-]{{0,61}}[a-z0-9])\.)+{}\b",
        regex::escape(domain)
    );
    Regex::new(&pattern).with_context(|| format!("Invalid domain for pattern: {}", domain))
}

/// Matches of the subdomain pattern in raw page text, minus escape residue
fn scrape_names<'t>(pattern: &Regex, text: &'t str) -> Vec<&'t str> {
    pattern
        .find_iter(text)
        .map(|m| strip_escape_residue(m.as_str()))
        .collect()
}

/// Links on the archive host that mention the root domain, resolved to absolute URLs
fn follow_links(page: &str, html: &str, source_domain: &str, domain: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page) else {
        return Vec::new();
    };
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let domain = domain.to_lowercase();
    let source_domain = source_domain.to_lowercase();

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .filter(|link| {
            link.host_str()
                .map(|host| {
                    let host = host.to_lowercase();
                    host == source_domain || host.ends_with(&format!(".{}", source_domain))
                })
                .unwrap_or(false)
        })
        .map(|mut link| {
            link.set_fragment(None);
            link.to_string()
        })
        .filter(|link| link.to_lowercase().contains(&domain))
        .collect()
}
