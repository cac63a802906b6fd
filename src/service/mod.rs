//! The execution contract shared by every data-source connector.
//!
//! A [`DiscoveryService`] pairs a fixed [`ServiceIdentity`] with an injected
//! [`SourceAdapter`] and its own [`RateLimiter`]. For each request it checks
//! scope, waits for the limiter, queries the adapter and fans the normalized
//! results out as new-name events. A request ends in exactly one of:
//! nothing emitted (filtered or empty result), one diagnostic event
//! (cancelled or source failure), or one new-name event per unique name.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::eventbus::{Event, EventSink, Priority, Subscription};
use crate::normalize::normalize;
use crate::ratelimit::{Cancelled, RateLimiter};
use crate::requests::{DiscoveredName, DiscoveryRequest, ServiceIdentity};
use crate::scope::{self, ScopeConfig};
use crate::sources::{SourceAdapter, DEFAULT_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceState {
    Idle = 0,
    ScopeChecking = 1,
    RateWaiting = 2,
    Querying = 3,
    Publishing = 4,
}

impl ServiceState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ServiceState::ScopeChecking,
            2 => ServiceState::RateWaiting,
            3 => ServiceState::Querying,
            4 => ServiceState::Publishing,
            _ => ServiceState::Idle,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ServiceState::Idle => "idle",
            ServiceState::ScopeChecking => "checking scope",
            ServiceState::RateWaiting => "rate limited",
            ServiceState::Querying => "querying",
            ServiceState::Publishing => "publishing",
        }
    }
}

/// How a single request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Empty input or out of scope; nothing was emitted
    Filtered,
    /// Cancelled while waiting or querying; one diagnostic was emitted
    Cancelled,
    /// The adapter reported an error; one diagnostic was emitted
    Failed,
    /// Query succeeded; this many new-name events were emitted
    Published(usize),
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("request cancelled")]
    Cancelled,

    #[error("{0:#}")]
    Source(anyhow::Error),
}

impl From<Cancelled> for DiscoveryError {
    fn from(_: Cancelled) -> Self {
        DiscoveryError::Cancelled
    }
}

impl From<anyhow::Error> for DiscoveryError {
    fn from(err: anyhow::Error) -> Self {
        if err.is::<Cancelled>() {
            DiscoveryError::Cancelled
        } else {
            DiscoveryError::Source(err)
        }
    }
}

/// Report sent by the worker loop after each request it handled
#[derive(Debug, Clone)]
pub struct Completion {
    pub source: String,
    pub request: DiscoveryRequest,
    pub outcome: Outcome,
}

pub struct DiscoveryService {
    identity: ServiceIdentity,
    adapter: Arc<dyn SourceAdapter>,
    limiter: RateLimiter,
    state: AtomicU8,
}

impl DiscoveryService {
    /// Creates a service limited to one query per second
    pub fn new(identity: ServiceIdentity, adapter: Arc<dyn SourceAdapter>) -> Self {
        DiscoveryService {
            identity,
            adapter,
            limiter: RateLimiter::new(DEFAULT_INTERVAL),
            state: AtomicU8::new(ServiceState::Idle as u8),
        }
    }

    pub fn with_rate_limit(mut self, interval: Duration) -> Self {
        self.limiter = RateLimiter::new(interval);
        self
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    pub fn state(&self) -> ServiceState {
        ServiceState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn rate_interval(&self) -> Duration {
        self.limiter.interval()
    }

    fn set_state(&self, state: ServiceState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Processes one request end to end.
    ///
    /// `scope` is the run configuration; `None` drops the request. All output
    /// goes through `sink`.
    pub async fn handle_request(
        &self,
        cancel: &CancellationToken,
        scope: Option<&dyn ScopeConfig>,
        sink: &dyn EventSink,
        request: &DiscoveryRequest,
    ) -> Outcome {
        self.set_state(ServiceState::ScopeChecking);
        if !scope::is_in_scope(scope, &request.name, &request.domain) {
            trace!(source = %self.identity, name = %request.name, "request filtered");
            self.set_state(ServiceState::Idle);
            return Outcome::Filtered;
        }

        let outcome = match self.discover(cancel, request).await {
            Ok(raw) => {
                self.set_state(ServiceState::Publishing);
                Outcome::Published(self.publish_names(sink, request, raw))
            }
            Err(err) => {
                debug!(source = %self.identity, name = %request.name, error = %err, "request failed");
                sink.publish(
                    Priority::High,
                    Event::Log(format!("{}: {}", self.identity, err)),
                );
                match err {
                    DiscoveryError::Cancelled => Outcome::Cancelled,
                    DiscoveryError::Source(_) => Outcome::Failed,
                }
            }
        };

        self.set_state(ServiceState::Idle);
        outcome
    }

    async fn discover(
        &self,
        cancel: &CancellationToken,
        request: &DiscoveryRequest,
    ) -> Result<Vec<String>, DiscoveryError> {
        self.set_state(ServiceState::RateWaiting);
        self.limiter.wait(cancel).await?;

        self.set_state(ServiceState::Querying);
        let query = self.adapter.query(
            cancel,
            &self.identity.base_url,
            &self.identity.target_domain,
            &request.name,
            &request.domain,
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DiscoveryError::Cancelled),
            result = query => result.map_err(DiscoveryError::from),
        }
    }

    fn publish_names(
        &self,
        sink: &dyn EventSink,
        request: &DiscoveryRequest,
        raw: Vec<String>,
    ) -> usize {
        let mut seen = HashSet::new();
        let mut published = 0;

        for candidate in raw {
            let name = normalize(&candidate);
            if name.is_empty() || !seen.insert(name.clone()) {
                continue;
            }

            sink.publish(
                Priority::High,
                Event::NewName(DiscoveredName {
                    name,
                    domain: request.domain.clone(),
                    tag: self.identity.source_type.to_string(),
                    source: self.identity.display_name.clone(),
                }),
            );
            published += 1;
        }

        debug!(source = %self.identity, name = %request.name, published, "request completed");
        published
    }

    /// Worker loop: handles requests from `requests` one at a time until
    /// `cancel` fires or the bus closes.
    pub async fn run(
        self: Arc<Self>,
        mut requests: Subscription,
        scope: Arc<dyn ScopeConfig>,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
        completions: Option<UnboundedSender<Completion>>,
    ) {
        debug!(source = %self.identity, "service started");

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = requests.recv() => event,
            };

            let request = match event {
                Some(Event::Request(request)) => request,
                Some(_) => continue,
                None => break,
            };

            let outcome = self
                .handle_request(&cancel, Some(scope.as_ref()), sink.as_ref(), &request)
                .await;

            if let Some(tx) = &completions {
                let _ = tx.send(Completion {
                    source: self.identity.display_name.clone(),
                    request,
                    outcome,
                });
            }
        }

        debug!(source = %self.identity, "service stopped");
    }
}
