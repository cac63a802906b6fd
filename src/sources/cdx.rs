use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::SourceAdapter;
use crate::network::get_with_retry;

/// Reads archived URLs for a host out of a CDX index and reports their hosts.
#[derive(Clone)]
pub struct CdxIndex {
    client: Client,
    retries: u32,
}

impl CdxIndex {
    pub fn new(client: Client, retries: u32) -> Self {
        CdxIndex { client, retries }
    }

    fn format_url(base_url: &str, name: &str) -> String {
        format!(
            "{}?url=*.{}/*&output=json&fl=original&collapse=urlkey",
            base_url, name
        )
    }

    async fn fetch_hosts(
        &self,
        cancel: &CancellationToken,
        base_url: &str,
        name: &str,
    ) -> Result<Vec<String>> {
        let url = Self::format_url(base_url, name);
        tracing::debug!(url = %url, "querying CDX index");

        let text = get_with_retry(&self.client, &url, self.retries, cancel).await?;
        parse_cdx_hosts(&text)
    }
}

impl SourceAdapter for CdxIndex {
    fn query<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        base_url: &'a str,
        _source_domain: &'a str,
        name: &'a str,
        _domain: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
        Box::pin(self.fetch_hosts(cancel, base_url, name))
    }
}

/// Extracts the distinct hosts of the `original` column, header row skipped
fn parse_cdx_hosts(text: &str) -> Result<Vec<String>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let json: Value = serde_json::from_str(text).context("Failed to parse CDX response")?;
    let rows = match json {
        Value::Array(rows) => rows,
        _ => anyhow::bail!("Unexpected CDX response shape"),
    };

    let mut seen = HashSet::new();
    let mut hosts = Vec::new();
    for row in rows.iter().skip(1) {
        let Some(Value::String(original)) = row.as_array().and_then(|cols| cols.first()) else {
            continue;
        };
        if let Some(host) = host_of(original) {
            if seen.insert(host.clone()) {
                hosts.push(host);
            }
        }
    }

    Ok(hosts)
}

fn host_of(original: &str) -> Option<String> {
    let parsed = Url::parse(original)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| Url::parse(&format!("http://{}", original)).ok())?;
    parsed.host_str().map(|h| h.to_string())
}
