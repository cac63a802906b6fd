use anyhow::Result;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::eventbus::{Event, EventBus, EventSink, Priority, Subscription, Topic};
use crate::network::NetworkSettings;
use crate::progress::SourceBars;
use crate::ratelimit::interval_for_rate;
use crate::requests::{DiscoveredName, DiscoveryRequest};
use crate::scope::{DomainScope, ScopeConfig};
use crate::service::{Completion, DiscoveryService, Outcome};
use crate::sources::{SourceKind, DEFAULT_INTERVAL};

/// How often the progress bars pick up each service's state
const STATE_REFRESH: Duration = Duration::from_millis(250);

/// Builds one discovery service per selected source.
///
/// `rate_limit` is in queries per second per source; `None` keeps the
/// default spacing.
pub fn build_services(
    kinds: &[SourceKind],
    settings: &NetworkSettings,
    rate_limit: Option<f32>,
) -> Result<Vec<Arc<DiscoveryService>>> {
    let interval = rate_limit.map(interval_for_rate).unwrap_or(DEFAULT_INTERVAL);

    kinds
        .iter()
        .map(|kind| {
            let service = kind.build_service(settings, interval)?;
            debug!(
                source = kind.short_name(),
                interval_ms = service.rate_interval().as_millis() as u64,
                timeout = settings.client.timeout,
                retries = settings.retries,
                proxy = settings.client.proxy.is_some(),
                "adding source"
            );
            Ok(Arc::new(service))
        })
        .collect()
}

/// Totals for one run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub rounds: usize,
    pub requests: usize,
    pub names: usize,
    pub failures: usize,
    pub cancelled: bool,
}

/// Drives a set of discovery services over the event bus.
///
/// Every service sees every request. Round zero queries the root domains;
/// each later round, up to `depth`, queries the names first reported in the
/// round before it.
pub struct Runner {
    services: Vec<Arc<DiscoveryService>>,
    scope: Arc<DomainScope>,
    depth: usize,
    max_time: Option<Duration>,
}

impl Runner {
    pub fn new(services: Vec<Arc<DiscoveryService>>, scope: DomainScope) -> Self {
        Runner {
            services,
            scope: Arc::new(scope),
            depth: 0,
            max_time: None,
        }
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_max_time(mut self, max_time: Option<Duration>) -> Self {
        self.max_time = max_time;
        self
    }

    pub fn source_names(&self) -> Vec<String> {
        self.services
            .iter()
            .map(|s| s.identity().display_name.clone())
            .collect()
    }

    /// Runs until every request has completed or `cancel` fires.
    ///
    /// Each in-scope name is passed to `on_name` exactly once.
    pub async fn run<F>(
        self,
        cancel: CancellationToken,
        bars: Option<&mut SourceBars>,
        on_name: F,
    ) -> Result<RunSummary>
    where
        F: FnMut(&DiscoveredName) -> Result<()>,
    {
        let bus = Arc::new(EventBus::new());
        let names = bus.subscribe(Topic::NewName);
        let logs = bus.subscribe(Topic::Log);
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let workers_token = cancel.child_token();
        let scope: Arc<dyn ScopeConfig> = self.scope.clone();
        let sink: Arc<dyn EventSink> = bus.clone();
        let handles: Vec<_> = self
            .services
            .iter()
            .map(|service| {
                tokio::spawn(service.clone().run(
                    bus.subscribe(Topic::DiscoveryRequest),
                    scope.clone(),
                    sink.clone(),
                    workers_token.clone(),
                    Some(done_tx.clone()),
                ))
            })
            .collect();
        drop(done_tx);
        debug!(
            workers = bus.subscriber_count(Topic::DiscoveryRequest),
            "source workers started"
        );

        let deadline = self.max_time.map(|limit| {
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                warn!(seconds = limit.as_secs(), "maximum run time reached, stopping");
                token.cancel();
            })
        });

        let mut session = Session {
            services: &self.services,
            scope: self.scope.as_ref(),
            bus: bus.as_ref(),
            names,
            logs,
            done: done_rx,
            bars,
            on_name,
            reported: HashSet::new(),
            requested: HashSet::new(),
            summary: RunSummary::default(),
        };

        let result = session
            .drive(&cancel, self.scope.roots(), self.services.len(), self.depth)
            .await;

        workers_token.cancel();
        bus.close();
        join_all(handles).await;
        if let Some(handle) = deadline {
            handle.abort();
        }

        result?;
        session.drain(false, &mut Vec::new())?;
        session.summary.cancelled = cancel.is_cancelled();

        info!(
            rounds = session.summary.rounds,
            requests = session.summary.requests,
            names = session.summary.names,
            failures = session.summary.failures,
            "run finished"
        );
        Ok(session.summary)
    }
}

struct Session<'a, F> {
    services: &'a [Arc<DiscoveryService>],
    scope: &'a DomainScope,
    bus: &'a EventBus,
    names: Subscription,
    logs: Subscription,
    done: UnboundedReceiver<Completion>,
    bars: Option<&'a mut SourceBars>,
    on_name: F,
    reported: HashSet<String>,
    requested: HashSet<String>,
    summary: RunSummary,
}

impl<F> Session<'_, F>
where
    F: FnMut(&DiscoveredName) -> Result<()>,
{
    async fn drive(
        &mut self,
        cancel: &CancellationToken,
        roots: &[String],
        workers: usize,
        depth: usize,
    ) -> Result<()> {
        if workers == 0 {
            return Ok(());
        }

        let mut ticker = tokio::time::interval(STATE_REFRESH);
        let mut frontier: Vec<DiscoveryRequest> = roots
            .iter()
            .filter(|root| self.requested.insert(root.to_string()))
            .map(|root| DiscoveryRequest::new(root.as_str(), root.as_str()))
            .collect();

        while !frontier.is_empty() && !cancel.is_cancelled() {
            let round = self.summary.rounds;
            let recurse = round < depth;
            debug!(round, requests = frontier.len(), "starting round");

            let mut pending = frontier.len() * workers;
            self.summary.rounds += 1;
            for request in frontier.drain(..) {
                self.summary.requests += 1;
                self.bus.publish(Priority::Low, Event::Request(request));
            }

            let mut next = Vec::new();
            while pending > 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    Some(event) = self.names.recv() => self.accept(event, recurse, &mut next)?,
                    Some(event) = self.logs.recv() => self.accept(event, recurse, &mut next)?,
                    completion = self.done.recv() => match completion {
                        Some(completion) => {
                            pending -= 1;
                            self.record(&completion);
                        }
                        None => {
                            warn!("all source workers stopped early");
                            return Ok(());
                        }
                    },
                    _ = ticker.tick(), if self.bars.is_some() => self.show_states(),
                }
            }

            // A worker publishes its names before reporting completion.
            self.drain(recurse, &mut next)?;
            frontier = next;
        }

        Ok(())
    }

    fn record(&mut self, completion: &Completion) {
        trace!(
            source = %completion.source,
            name = %completion.request.name,
            outcome = ?completion.outcome,
            "request completed"
        );
        if completion.outcome == Outcome::Failed {
            self.summary.failures += 1;
        }
        if let Some(bars) = self.bars.as_deref_mut() {
            bars.record(completion);
        }
    }

    fn show_states(&mut self) {
        let Some(bars) = self.bars.as_deref_mut() else {
            return;
        };
        for service in self.services {
            bars.show_state(&service.identity().display_name, service.state());
        }
    }

    fn drain(&mut self, recurse: bool, next: &mut Vec<DiscoveryRequest>) -> Result<()> {
        while let Some(event) = self.names.try_recv() {
            self.accept(event, recurse, next)?;
        }
        while let Some(event) = self.logs.try_recv() {
            self.accept(event, recurse, next)?;
        }
        Ok(())
    }

    fn accept(
        &mut self,
        event: Event,
        recurse: bool,
        next: &mut Vec<DiscoveryRequest>,
    ) -> Result<()> {
        match event {
            Event::NewName(found) => {
                if !self.scope.is_domain_in_scope(&found.name) {
                    trace!(name = %found.name, source = %found.source, "dropping out-of-scope name");
                    return Ok(());
                }

                if self.reported.insert(found.name.clone()) {
                    self.summary.names += 1;
                    (self.on_name)(&found)?;
                }

                if recurse && self.requested.insert(found.name.clone()) {
                    // Nested roots: the deeper root owns the name from here on
                    let domain = self
                        .scope
                        .root_of(&found.name)
                        .map(str::to_string)
                        .unwrap_or(found.domain);
                    next.push(
                        DiscoveryRequest::new(found.name, domain)
                            .with_provenance(found.tag, found.source),
                    );
                }
            }
            Event::Log(message) => warn!("{}", message),
            Event::Request(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::{ServiceIdentity, SourceType};
    use crate::sources::SourceAdapter;
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    /// Answers each queried name from a fixed table
    struct TableAdapter {
        table: HashMap<&'static str, Vec<&'static str>>,
        queried: Mutex<Vec<(String, String)>>,
    }

    impl TableAdapter {
        fn new(entries: &[(&'static str, &[&'static str])]) -> Arc<Self> {
            Arc::new(TableAdapter {
                table: entries.iter().map(|(k, v)| (*k, v.to_vec())).collect(),
                queried: Mutex::new(Vec::new()),
            })
        }

        fn queried(&self) -> Vec<String> {
            let mut q: Vec<String> = self.queried.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
            q.sort();
            q
        }

        fn domain_of(&self, name: &str) -> Option<String> {
            self.queried
                .lock()
                .unwrap()
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, d)| d.clone())
        }
    }

    impl SourceAdapter for TableAdapter {
        fn query<'a>(
            &'a self,
            _cancel: &'a CancellationToken,
            _base_url: &'a str,
            _source_domain: &'a str,
            name: &'a str,
            domain: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
            self.queried
                .lock()
                .unwrap()
                .push((name.to_string(), domain.to_string()));
            let found = self
                .table
                .get(name)
                .map(|names| names.iter().map(|n| n.to_string()).collect())
                .unwrap_or_default();
            Box::pin(async move { Ok(found) })
        }
    }

    struct FailingAdapter;

    impl SourceAdapter for FailingAdapter {
        fn query<'a>(
            &'a self,
            _cancel: &'a CancellationToken,
            _base_url: &'a str,
            _source_domain: &'a str,
            _name: &'a str,
            _domain: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
            Box::pin(async { anyhow::bail!("503 Service Unavailable") })
        }
    }

    struct HangingAdapter;

    impl SourceAdapter for HangingAdapter {
        fn query<'a>(
            &'a self,
            cancel: &'a CancellationToken,
            _base_url: &'a str,
            _source_domain: &'a str,
            _name: &'a str,
            _domain: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
            Box::pin(async move {
                cancel.cancelled().await;
                Err(crate::ratelimit::Cancelled.into())
            })
        }
    }

    fn service(name: &str, adapter: Arc<dyn SourceAdapter>) -> Arc<DiscoveryService> {
        let identity = ServiceIdentity::new(SourceType::Archive, name, "http://archive.test", "archive.test");
        Arc::new(DiscoveryService::new(identity, adapter).with_rate_limit(Duration::ZERO))
    }

    async fn collect(runner: Runner, cancel: CancellationToken) -> (RunSummary, Vec<DiscoveredName>) {
        let mut found = Vec::new();
        let summary = runner
            .run(cancel, None, |name| {
                found.push(name.clone());
                Ok(())
            })
            .await
            .unwrap();
        (summary, found)
    }

    fn sorted_names(found: &[DiscoveredName]) -> Vec<String> {
        let mut names: Vec<String> = found.iter().map(|n| n.name.clone()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_build_services_applies_rate_limit() {
        let kinds = [SourceKind::Wayback, SourceKind::WaybackCdx];
        let services = build_services(&kinds, &NetworkSettings::default(), Some(4.0)).unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].identity().display_name, "Wayback");
        assert_eq!(services[1].identity().display_name, "WaybackCDX");
        assert!(services
            .iter()
            .all(|s| s.rate_interval() == Duration::from_millis(250)));

        let defaults = build_services(&kinds, &NetworkSettings::default(), None).unwrap();
        assert_eq!(defaults[0].rate_interval(), DEFAULT_INTERVAL);
    }

    #[tokio::test]
    async fn test_names_are_reported_once_across_sources() {
        let a = TableAdapter::new(&[("example.com", &["www.example.com", "mail.example.com"])]);
        let b = TableAdapter::new(&[("example.com", &["WWW.example.com", "dev.example.com"])]);
        let runner = Runner::new(
            vec![service("A", a.clone()), service("B", b.clone())],
            DomainScope::new(["example.com"]),
        );

        let (summary, found) = collect(runner, CancellationToken::new()).await;

        assert_eq!(
            sorted_names(&found),
            vec!["dev.example.com", "mail.example.com", "www.example.com"]
        );
        assert_eq!(summary.rounds, 1);
        assert_eq!(summary.requests, 1);
        assert_eq!(summary.names, 3);
        assert!(!summary.cancelled);
        assert_eq!(a.queried(), vec!["example.com"]);
        assert_eq!(b.queried(), vec!["example.com"]);
    }

    #[tokio::test]
    async fn test_out_of_scope_and_blacklisted_names_are_dropped() {
        let a = TableAdapter::new(&[(
            "example.com",
            &["www.example.com", "cdn.other.net", "vpn.internal.example.com"],
        )]);
        let runner = Runner::new(
            vec![service("A", a)],
            DomainScope::new(["example.com"]).with_blacklist(["internal.example.com"]),
        );

        let (_, found) = collect(runner, CancellationToken::new()).await;
        assert_eq!(sorted_names(&found), vec!["www.example.com"]);
        assert_eq!(found[0].domain, "example.com");
        assert_eq!(found[0].source, "A");
        assert_eq!(found[0].tag, "archive");
    }

    #[tokio::test]
    async fn test_depth_zero_queries_only_roots() {
        let a = TableAdapter::new(&[
            ("example.com", &["www.example.com"]),
            ("www.example.com", &["deep.www.example.com"]),
        ]);
        let runner = Runner::new(vec![service("A", a.clone())], DomainScope::new(["example.com"]));

        let (summary, found) = collect(runner, CancellationToken::new()).await;
        assert_eq!(sorted_names(&found), vec!["www.example.com"]);
        assert_eq!(summary.rounds, 1);
        assert_eq!(a.queried(), vec!["example.com"]);
    }

    #[tokio::test]
    async fn test_depth_feeds_new_names_back() {
        let a = TableAdapter::new(&[
            ("example.com", &["www.example.com", "example.com"]),
            ("www.example.com", &["deep.www.example.com", "www.example.com"]),
            ("deep.www.example.com", &["deeper.deep.www.example.com"]),
        ]);
        let runner = Runner::new(vec![service("A", a.clone())], DomainScope::new(["example.com"]))
            .with_depth(1);

        let (summary, found) = collect(runner, CancellationToken::new()).await;

        assert_eq!(
            sorted_names(&found),
            vec!["deep.www.example.com", "example.com", "www.example.com"]
        );
        assert_eq!(summary.rounds, 2);
        assert_eq!(summary.requests, 2);
        assert_eq!(a.queried(), vec!["example.com", "www.example.com"]);
    }

    #[tokio::test]
    async fn test_recursion_uses_the_deepest_matching_root() {
        let a = TableAdapter::new(&[
            ("example.com", &["api.dev.example.com", "www.example.com"]),
            ("dev.example.com", &[]),
        ]);
        let runner = Runner::new(
            vec![service("A", a.clone())],
            DomainScope::new(["example.com", "dev.example.com"]),
        )
        .with_depth(1);

        let (_, found) = collect(runner, CancellationToken::new()).await;

        assert_eq!(sorted_names(&found), vec!["api.dev.example.com", "www.example.com"]);
        assert_eq!(a.domain_of("api.dev.example.com").as_deref(), Some("dev.example.com"));
        assert_eq!(a.domain_of("www.example.com").as_deref(), Some("example.com"));
    }

    #[tokio::test]
    async fn test_run_with_progress_bars() {
        let a = TableAdapter::new(&[("example.com", &["www.example.com"])]);
        let runner = Runner::new(vec![service("A", a)], DomainScope::new(["example.com"]));
        let manager = crate::progress::ProgressManager::new(true);
        let mut bars = manager.create_source_bars(&runner.source_names());

        let mut found = Vec::new();
        let summary = runner
            .run(CancellationToken::new(), Some(&mut bars), |name| {
                found.push(name.clone());
                Ok(())
            })
            .await
            .unwrap();
        bars.finish();

        assert_eq!(summary.names, 1);
        assert_eq!(sorted_names(&found), vec!["www.example.com"]);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let good = TableAdapter::new(&[("example.com", &["www.example.com"])]);
        let runner = Runner::new(
            vec![service("Good", good), service("Bad", Arc::new(FailingAdapter))],
            DomainScope::new(["example.com"]),
        );

        let (summary, found) = collect(runner, CancellationToken::new()).await;
        assert_eq!(sorted_names(&found), vec!["www.example.com"]);
        assert_eq!(summary.failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_time_stops_the_run() {
        let runner = Runner::new(
            vec![service("Slow", Arc::new(HangingAdapter))],
            DomainScope::new(["example.com"]),
        )
        .with_max_time(Some(Duration::from_secs(5)));

        let started = tokio::time::Instant::now();
        let (summary, found) = collect(runner, CancellationToken::new()).await;

        assert!(summary.cancelled);
        assert!(found.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_does_nothing() {
        let a = TableAdapter::new(&[("example.com", &["www.example.com"])]);
        let runner = Runner::new(vec![service("A", a.clone())], DomainScope::new(["example.com"]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (summary, found) = collect(runner, cancel).await;
        assert!(summary.cancelled);
        assert_eq!(summary.requests, 0);
        assert!(found.is_empty());
        assert!(a.queried().is_empty());
    }

    #[tokio::test]
    async fn test_output_error_stops_the_run() {
        let a = TableAdapter::new(&[("example.com", &["www.example.com"])]);
        let runner = Runner::new(vec![service("A", a)], DomainScope::new(["example.com"]));

        let err = runner
            .run(CancellationToken::new(), None, |_| anyhow::bail!("broken pipe"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("broken pipe"));
    }
}
