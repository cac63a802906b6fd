use serde::Serialize;
use std::fmt;

/// Category of a data source, carried as the tag of every name it discovers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Crawled from archived pages
    Archive,
    /// Answered by a structured index query
    Api,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Archive => "archive",
            SourceType::Api => "api",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asks a data source whether a host under a root domain yields more names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRequest {
    pub name: String,
    pub domain: String,
    pub tag: String,
    pub source: String,
}

impl DiscoveryRequest {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        DiscoveryRequest {
            name: name.into(),
            domain: domain.into(),
            tag: String::new(),
            source: String::new(),
        }
    }

    pub fn with_provenance(mut self, tag: impl Into<String>, source: impl Into<String>) -> Self {
        self.tag = tag.into();
        self.source = source.into();
        self
    }
}

/// A normalized name reported by a data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredName {
    pub name: String,
    pub domain: String,
    pub tag: String,
    pub source: String,
}

/// Fixed identity of a discovery service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub source_type: SourceType,
    pub display_name: String,
    pub base_url: String,
    pub target_domain: String,
}

impl ServiceIdentity {
    pub fn new(
        source_type: SourceType,
        display_name: impl Into<String>,
        base_url: impl Into<String>,
        target_domain: impl Into<String>,
    ) -> Self {
        ServiceIdentity {
            source_type,
            display_name: display_name.into(),
            base_url: base_url.into(),
            target_domain: target_domain.into(),
        }
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}
