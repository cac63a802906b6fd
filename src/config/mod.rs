use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::Args;

/// Represents the application configuration loaded from a file
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub scope: DomainsConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Default)]
pub struct DomainsConfig {
    pub domains: Option<Vec<String>>,
    pub blacklist: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SourceConfig {
    pub sources: Option<Vec<String>>,
    pub rate_limit: Option<f32>,
    pub depth: Option<usize>,
    pub max_pages: Option<usize>,
    pub max_time: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct NetworkConfig {
    pub proxy: Option<String>,
    pub proxy_auth: Option<String>,
    pub insecure: Option<bool>,
    pub random_agent: Option<bool>,
    pub timeout: Option<u64>,
    pub retries: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct OutputConfig {
    pub output: Option<String>,
    pub format: Option<String>,
    pub show_source: Option<bool>,
}

impl Config {
    /// Load configuration from a specific file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Get the default configuration file path
    /// - Linux/macOS: ~/.config/subarc/config.toml
    /// - Windows: %AppData%\subarc\config.toml
    ///
    /// Missing directories and an empty config file are created on first use.
    pub fn default_path() -> Option<PathBuf> {
        let config_dir = config_root()?.join("subarc");
        let config_path = config_dir.join("config.toml");

        if !config_dir.exists() && fs::create_dir_all(&config_dir).is_err() {
            return None;
        }

        if !config_path.exists() && fs::write(&config_path, "").is_err() {
            return None;
        }

        Some(config_path)
    }

    /// Load configuration based on command line arguments
    /// Priority: --config flag > default path > default values
    ///
    /// An explicit `--config` that cannot be read or parsed is an error.
    pub fn load(args: &Args) -> Result<Self> {
        if let Some(path) = &args.config {
            return Self::from_file(path);
        }

        if let Some(default_path) = Self::default_path() {
            match Self::from_file(&default_path) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!(error = %format!("{:#}", e), "ignoring default config file"),
            }
        }

        Ok(Config::default())
    }

    /// Apply configuration values to Args, respecting priority
    /// Command line arguments take precedence over config file values
    pub fn apply_to_args(self, args: &mut Args) {
        // Scope options
        if args.domains.is_empty() {
            if let Some(domains) = self.scope.domains {
                args.domains = domains;
            }
        }

        if args.blacklist.is_empty() {
            if let Some(blacklist) = self.scope.blacklist {
                args.blacklist = blacklist;
            }
        }

        // Source options
        if args.sources == vec!["all"] {
            if let Some(sources) = self.source.sources {
                args.sources = sources;
            }
        }

        if args.rate_limit.is_none() {
            args.rate_limit = self.source.rate_limit;
        }

        if args.depth == 0 {
            if let Some(depth) = self.source.depth {
                args.depth = depth;
            }
        }

        if args.max_pages == 10 {
            if let Some(max_pages) = self.source.max_pages {
                args.max_pages = max_pages;
            }
        }

        if args.max_time.is_none() {
            args.max_time = self.source.max_time;
        }

        // Network options
        if args.proxy.is_none() {
            args.proxy = self.network.proxy;
        }

        if args.proxy_auth.is_none() {
            args.proxy_auth = self.network.proxy_auth;
        }

        if !args.insecure && self.network.insecure.unwrap_or(false) {
            args.insecure = true;
        }

        if !args.random_agent && self.network.random_agent.unwrap_or(false) {
            args.random_agent = true;
        }

        if args.timeout == 30 {
            if let Some(timeout) = self.network.timeout {
                args.timeout = timeout;
            }
        }

        if args.retries == 3 {
            if let Some(retries) = self.network.retries {
                args.retries = retries;
            }
        }

        // Output options
        if args.output.is_none() {
            if let Some(output) = self.output.output {
                args.output = Some(PathBuf::from(output));
            }
        }

        if args.format == "plain" {
            if let Some(format) = self.output.format {
                args.format = format;
            }
        }

        if !args.show_source && self.output.show_source.unwrap_or(false) {
            args.show_source = true;
        }
    }
}

fn config_root() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        env::var_os("APPDATA").map(PathBuf::from)
    }

    #[cfg(not(windows))]
    {
        env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))
    }
}
