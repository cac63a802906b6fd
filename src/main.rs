use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod config;
mod eventbus;
mod network;
mod normalize;
mod output;
mod progress;
mod ratelimit;
mod requests;
mod runner;
mod scope;
mod service;
mod sources;

use cli::{read_domains_from_stdin, Args};
use config::Config;
use network::NetworkSettings;
use output::NameWriter;
use progress::ProgressManager;
use runner::{build_services, Runner};
use scope::DomainScope;
use sources::parse_sources;

/// Logs go to stderr so stdout carries only discovered names
fn init_tracing(args: &Args) {
    let default = if args.silent {
        "error"
    } else if args.verbose {
        "warn,subarc=debug"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = Args::parse();
    init_tracing(&args);

    let config = Config::load(&args)?;
    config.apply_to_args(&mut args);

    // Collect domains either from arguments, the config file or stdin
    if args.domains.is_empty() {
        args.domains = read_domains_from_stdin()?;
    }

    let scope = DomainScope::new(&args.domains).with_blacklist(&args.blacklist);
    if scope.roots().is_empty() {
        error!("No domains provided. Please specify domains or pipe them through stdin.");
        return Ok(());
    }

    let kinds = parse_sources(&args.sources)?;
    if kinds.is_empty() {
        error!("No sources selected");
        return Ok(());
    }

    let settings = NetworkSettings::from_args(&args);
    let services = build_services(&kinds, &settings, args.rate_limit)?;
    let runner = Runner::new(services, scope)
        .with_depth(args.depth)
        .with_max_time(args.max_time.map(Duration::from_secs));

    let progress = ProgressManager::new(args.no_progress || args.silent);
    let mut bars = progress.create_source_bars(&runner.source_names());

    let mut writer = match &args.output {
        Some(path) => NameWriter::file(path, &args.format, args.show_source)?,
        None => NameWriter::stdout(&args.format, args.show_source),
    };

    let cancel = CancellationToken::new();
    let interrupt = {
        let token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping");
                token.cancel();
            }
        })
    };

    let summary = runner
        .run(cancel, Some(&mut bars), |name| {
            progress.suspend(|| writer.write(name))
        })
        .await;

    interrupt.abort();
    bars.finish();
    writer.finish()?;

    let summary = summary?;
    info!(
        names = writer.written(),
        requests = summary.requests,
        failures = summary.failures,
        "done"
    );
    if let Some(path) = &args.output {
        info!(path = %path.display(), "results written");
    }

    Ok(())
}
