use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::network::NetworkSettings;
use crate::requests::{ServiceIdentity, SourceType};
use crate::service::DiscoveryService;

mod cdx;
mod crawler;

pub use cdx::CdxIndex;
pub use crawler::ArchiveCrawler;

/// Performs the actual call against one external data source.
///
/// Implementations must return promptly with an error once `cancel` fires and
/// must report every failure as an error value.
pub trait SourceAdapter: Send + Sync {
    fn query<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        base_url: &'a str,
        source_domain: &'a str,
        name: &'a str,
        domain: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>>;
}

/// Default spacing between queries to one archive
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// The archive connectors this tool knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    LocArchive,
    Wayback,
    ArchiveIt,
    Arquivo,
    UkWebArchive,
    WaybackCdx,
}

impl SourceKind {
    pub const ALL: [SourceKind; 6] = [
        SourceKind::LocArchive,
        SourceKind::Wayback,
        SourceKind::ArchiveIt,
        SourceKind::Arquivo,
        SourceKind::UkWebArchive,
        SourceKind::WaybackCdx,
    ];

    /// Parses the short name used on the command line and in config files
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "loc" | "locarchive" => Some(SourceKind::LocArchive),
            "wayback" => Some(SourceKind::Wayback),
            "archiveit" => Some(SourceKind::ArchiveIt),
            "arquivo" => Some(SourceKind::Arquivo),
            "ukwebarchive" | "ukwa" => Some(SourceKind::UkWebArchive),
            "cdx" => Some(SourceKind::WaybackCdx),
            _ => None,
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            SourceKind::LocArchive => "loc",
            SourceKind::Wayback => "wayback",
            SourceKind::ArchiveIt => "archiveit",
            SourceKind::Arquivo => "arquivo",
            SourceKind::UkWebArchive => "ukwebarchive",
            SourceKind::WaybackCdx => "cdx",
        }
    }

    pub fn identity(&self) -> ServiceIdentity {
        let (display, base_url, target) = match self {
            SourceKind::LocArchive => (
                "LoCArchive",
                "http://webarchive.loc.gov/all",
                "webarchive.loc.gov",
            ),
            SourceKind::Wayback => ("Wayback", "http://web.archive.org/web", "web.archive.org"),
            SourceKind::ArchiveIt => (
                "ArchiveIt",
                "https://wayback.archive-it.org/all",
                "wayback.archive-it.org",
            ),
            SourceKind::Arquivo => ("Arquivo", "https://arquivo.pt/wayback", "arquivo.pt"),
            SourceKind::UkWebArchive => (
                "UKWebArchive",
                "https://www.webarchive.org.uk/wayback/archive",
                "webarchive.org.uk",
            ),
            SourceKind::WaybackCdx => (
                "WaybackCDX",
                "https://web.archive.org/cdx/search/cdx",
                "web.archive.org",
            ),
        };
        let source_type = match self {
            SourceKind::WaybackCdx => SourceType::Api,
            _ => SourceType::Archive,
        };
        ServiceIdentity::new(source_type, display, base_url, target)
    }

    /// Builds the discovery service for this connector
    pub fn build_service(
        &self,
        settings: &NetworkSettings,
        interval: Duration,
    ) -> Result<DiscoveryService> {
        let client = settings.client.build_client()?;
        let adapter: Arc<dyn SourceAdapter> = match self {
            SourceKind::WaybackCdx => Arc::new(CdxIndex::new(client, settings.retries)),
            _ => Arc::new(ArchiveCrawler::new(
                client,
                settings.retries,
                settings.max_pages,
            )),
        };
        Ok(DiscoveryService::new(self.identity(), adapter).with_rate_limit(interval))
    }
}

/// Resolves a list of source names, reporting the first unknown one
pub fn parse_sources(names: &[String]) -> Result<Vec<SourceKind>> {
    let mut kinds = Vec::new();
    for name in names {
        if name.trim().eq_ignore_ascii_case("all") {
            for kind in SourceKind::ALL {
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
            continue;
        }
        let kind = SourceKind::from_name(name).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown source '{}'. Valid sources: all, {}",
                name,
                SourceKind::ALL.map(|k| k.short_name()).join(", ")
            )
        })?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}
