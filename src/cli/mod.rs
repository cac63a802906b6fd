use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "subarc", version)]
pub struct Args {
    /// Root domains to discover subdomains for
    #[clap(name = "DOMAINS")]
    pub domains: Vec<String>,

    /// Config file to load (default: ~/.config/subarc/config.toml)
    #[clap(short, long, value_parser)]
    pub config: Option<PathBuf>,

    #[clap(help_heading = "Output Options")]
    /// Output file to write results
    #[clap(short, long, value_parser)]
    pub output: Option<PathBuf>,

    /// Output format
    #[clap(help_heading = "Output Options")]
    #[clap(short, long, default_value = "plain", value_parser = ["plain", "json"])]
    pub format: String,

    /// Show the tag and source next to each name in plain output
    #[clap(help_heading = "Output Options")]
    #[clap(long)]
    pub show_source: bool,

    /// Sources to query (comma-separated, e.g., "loc,wayback,cdx" or "all")
    #[clap(help_heading = "Source Options")]
    #[clap(short, long, value_delimiter = ',', default_value = "all")]
    pub sources: Vec<String>,

    /// Names that must never be queried or reported, subdomains included (comma-separated)
    #[clap(help_heading = "Source Options")]
    #[clap(short, long, value_delimiter = ',')]
    pub blacklist: Vec<String>,

    /// Queries per second allowed against each source
    #[clap(help_heading = "Source Options")]
    #[clap(long)]
    pub rate_limit: Option<f32>,

    /// Rounds of feeding discovered names back as new requests
    #[clap(help_heading = "Source Options")]
    #[clap(short, long, default_value = "0")]
    pub depth: usize,

    /// Archive pages crawled per request
    #[clap(help_heading = "Source Options")]
    #[clap(long, default_value = "10")]
    pub max_pages: usize,

    /// Stop the whole run after this many seconds
    #[clap(help_heading = "Source Options")]
    #[clap(long)]
    pub max_time: Option<u64>,

    #[clap(help_heading = "Display Options")]
    /// Show verbose output
    #[clap(short, long)]
    pub verbose: bool,

    #[clap(help_heading = "Display Options")]
    /// Silent mode (errors only)
    #[clap(long)]
    pub silent: bool,

    #[clap(help_heading = "Display Options")]
    /// No progress bar
    #[clap(long)]
    pub no_progress: bool,

    #[clap(help_heading = "Network Options")]
    /// Use proxy for HTTP requests (format: http://proxy.example.com:8080)
    #[clap(long)]
    pub proxy: Option<String>,

    /// Proxy authentication credentials (format: username:password)
    #[clap(help_heading = "Network Options")]
    #[clap(long)]
    pub proxy_auth: Option<String>,

    /// Skip SSL certificate verification (accept self-signed certs)
    #[clap(help_heading = "Network Options")]
    #[clap(long)]
    pub insecure: bool,

    /// Use a random User-Agent for HTTP requests
    #[clap(help_heading = "Network Options")]
    #[clap(long)]
    pub random_agent: bool,

    /// Request timeout in seconds
    #[clap(help_heading = "Network Options")]
    #[clap(long, default_value = "30")]
    pub timeout: u64,

    /// Number of retries for failed requests
    #[clap(help_heading = "Network Options")]
    #[clap(long, default_value = "3")]
    pub retries: u32,
}

pub fn read_domains_from_stdin() -> anyhow::Result<Vec<String>> {
    use anyhow::Context;
    use std::io::{self, BufRead};

    let stdin = io::stdin();
    parse_domain_lines(stdin.lock().lines().map(|line| {
        line.context("Failed to read line from stdin")
    }))
}

/// Keeps non-empty, non-comment lines, trimmed
fn parse_domain_lines<I>(lines: I) -> anyhow::Result<Vec<String>>
where
    I: IntoIterator<Item = anyhow::Result<String>>,
{
    let mut domains = Vec::new();
    for line in lines {
        let line = line?;
        let domain = line.trim();
        if !domain.is_empty() && !domain.starts_with('#') {
            domains.push(domain.to_string());
        }
    }
    Ok(domains)
}
