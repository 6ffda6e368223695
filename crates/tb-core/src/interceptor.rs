//! Request interception for one page-load session.
//!
//! A [`PageSession`] sits between the host runtime and the [`Engine`]: the
//! host reports resource loads and navigations, the session asks the engine
//! for a [`Decision`] and enforces it through the host's primitives.
//!
//! State machine:
//!
//! ```text
//! Uninitialized --(rules available)--> Active
//!       ^                                 |
//!       |                          navigate(url)
//!       |                                 v
//!       +----(rules missing)-------- Navigating --(finish_navigation)--> Active
//! ```
//!
//! Loads seen while no rule set is available follow the configured
//! [`PendingPolicy`]. While Navigating with rules available, loads are
//! evaluated against the new page.
//! Navigation is never deferred: it clears the pending queue and bumps the
//! page generation so verdicts prepared for the previous page are dropped.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::{InterceptorConfig, PendingPolicy};
use crate::engine::Engine;
use crate::error::HostError;
use crate::stats::StatisticsCollector;
use crate::types::{Decision, RequestContext, ResourceType};
use crate::url::extract_host;

/// Host-side identifier of a DOM node.
pub type NodeId = u64;

/// Where a load came from, which decides how it is prevented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    /// A network call (fetch/XHR/beacon style), cancelled by request id
    Network { request_id: u64 },
    /// An inserted element (script, img, iframe), removed before it fetches
    Element { node: NodeId },
}

/// A resource load observed by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLoad {
    pub url: String,
    pub resource_type: ResourceType,
    pub origin: LoadOrigin,
}

impl ResourceLoad {
    pub fn network(request_id: u64, url: impl Into<String>, resource_type: ResourceType) -> Self {
        Self {
            url: url.into(),
            resource_type,
            origin: LoadOrigin::Network { request_id },
        }
    }

    pub fn element(node: NodeId, url: impl Into<String>, resource_type: ResourceType) -> Self {
        Self {
            url: url.into(),
            resource_type,
            origin: LoadOrigin::Element { node },
        }
    }
}

/// Primitives the embedding runtime provides to a page session.
pub trait PageHost {
    /// Cancel an in-flight network call.
    fn cancel_load(&self, request_id: u64) -> Result<(), HostError>;

    /// Remove an element before it fetches its resource.
    fn remove_node(&self, node: NodeId) -> Result<(), HostError>;

    /// Run a script in the page's scripting context, synchronously.
    fn run_script(&self, source: &str) -> Result<(), HostError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active,
    Navigating,
}

/// What the session did with a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enforcement {
    Allowed,
    Blocked,
    /// Blocked, and the surrogate ran in its place
    Replaced,
    /// Queued until the session becomes active
    Deferred,
    /// Verdict belonged to a page that has since navigated away
    Dropped,
}

/// A decision prepared for a load, tied to the page generation it was
/// made for.
#[derive(Debug, Clone)]
pub struct Verdict {
    generation: u64,
    load: ResourceLoad,
    decision: Decision,
}

impl Verdict {
    pub fn decision(&self) -> &Decision {
        &self.decision
    }

    pub fn load(&self) -> &ResourceLoad {
        &self.load
    }
}

/// Tally of a batch of loads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub allowed: usize,
    pub blocked: usize,
    pub replaced: usize,
    pub deferred: usize,
    pub dropped: usize,
}

impl BatchSummary {
    fn add(&mut self, enforcement: Enforcement) {
        match enforcement {
            Enforcement::Allowed => self.allowed += 1,
            Enforcement::Blocked => self.blocked += 1,
            Enforcement::Replaced => self.replaced += 1,
            Enforcement::Deferred => self.deferred += 1,
            Enforcement::Dropped => self.dropped += 1,
        }
    }
}

// =============================================================================
// Page Session
// =============================================================================

/// Interception state for one page-load session.
pub struct PageSession<H: PageHost> {
    engine: Arc<Engine>,
    stats: Arc<StatisticsCollector>,
    host: H,
    config: InterceptorConfig,
    state: SessionState,
    /// Host of the current top-level page; the initiator of its sub-resources
    page_domain: String,
    generation: u64,
    pending: VecDeque<ResourceLoad>,
    host_failures: u64,
}

impl<H: PageHost> PageSession<H> {
    pub fn new(engine: Arc<Engine>, stats: Arc<StatisticsCollector>, host: H, config: InterceptorConfig) -> Self {
        Self {
            engine,
            stats,
            host,
            config,
            state: SessionState::Uninitialized,
            page_domain: String::new(),
            generation: 0,
            pending: VecDeque::new(),
            host_failures: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn page_domain(&self) -> &str {
        &self.page_domain
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of host primitive calls that failed.
    pub fn host_failures(&self) -> u64 {
        self.host_failures
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Become Active if the engine has rules, replaying queued loads in
    /// their original order. Returns whether the session is Active.
    pub fn activate(&mut self) -> bool {
        match self.state {
            SessionState::Active => true,
            SessionState::Navigating => false,
            SessionState::Uninitialized => {
                if !self.engine.is_ready() {
                    return false;
                }
                self.state = SessionState::Active;
                self.flush_pending();
                true
            }
        }
    }

    /// Handle a top-level URL change. Processed immediately in every state.
    pub fn navigate(&mut self, url: &str) {
        let dropped = self.pending.len();
        self.pending.clear();
        self.generation += 1;
        self.state = SessionState::Navigating;
        self.page_domain = extract_host(url)
            .map(|host| host.to_ascii_lowercase())
            .unwrap_or_default();

        log::info!(
            "Navigating to {:?} (generation {}, dropped {} pending loads)",
            self.page_domain,
            self.generation,
            dropped
        );
    }

    /// The new page has committed. Becomes Active when rules are available,
    /// Uninitialized otherwise.
    pub fn finish_navigation(&mut self) {
        if self.state != SessionState::Navigating {
            return;
        }
        self.state = SessionState::Uninitialized;
        self.activate();
    }

    /// Evaluate a load for the current page without enforcing anything.
    ///
    /// Takes `&self` so evaluation can run wherever the host likes; the
    /// verdict is enforced later with [`PageSession::apply`].
    pub fn prepare(&self, load: ResourceLoad) -> Verdict {
        let decision = {
            let ctx = RequestContext::new(&load.url, load.resource_type, &self.page_domain);
            self.engine.evaluate(&ctx)
        };
        Verdict {
            generation: self.generation,
            load,
            decision,
        }
    }

    /// Enforce a prepared verdict, unless the page has navigated since it
    /// was prepared.
    pub fn apply(&mut self, verdict: Verdict) -> Enforcement {
        if verdict.generation != self.generation {
            log::debug!(
                "Dropping verdict for {} from generation {} (now {})",
                verdict.load.url,
                verdict.generation,
                self.generation
            );
            return Enforcement::Dropped;
        }
        self.enforce(&verdict.load, &verdict.decision)
    }

    /// Handle one observed resource load.
    pub fn on_resource_load(&mut self, load: ResourceLoad) -> Enforcement {
        if self.state == SessionState::Uninitialized {
            self.activate();
        }

        match self.state {
            SessionState::Active => {
                let verdict = self.prepare(load);
                self.apply(verdict)
            }
            SessionState::Navigating if self.engine.is_ready() => {
                // Loads queued earlier in this navigation go first
                self.flush_pending();
                let verdict = self.prepare(load);
                self.apply(verdict)
            }
            SessionState::Uninitialized | SessionState::Navigating => self.hold(load),
        }
    }

    /// Handle a sequence of loads. Each is processed on its own; a host
    /// failure on one does not stop the rest.
    pub fn on_resource_loads<I>(&mut self, loads: I) -> BatchSummary
    where
        I: IntoIterator<Item = ResourceLoad>,
    {
        let mut summary = BatchSummary::default();
        for load in loads {
            summary.add(self.on_resource_load(load));
        }
        summary
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn hold(&mut self, load: ResourceLoad) -> Enforcement {
        match self.config.pending_policy {
            PendingPolicy::FailOpen => {
                log::warn!("Rules not ready ({:?}), allowing {}", self.state, load.url);
                self.stats.record_allowed(load.resource_type);
                Enforcement::Allowed
            }
            PendingPolicy::Queue => {
                if self.pending.len() >= self.config.queue_capacity {
                    log::warn!(
                        "Pending queue full ({} loads), allowing {}",
                        self.pending.len(),
                        load.url
                    );
                    self.stats.record_allowed(load.resource_type);
                    return Enforcement::Allowed;
                }
                self.pending.push_back(load);
                Enforcement::Deferred
            }
        }
    }

    fn flush_pending(&mut self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        while let Some(load) = self.pending.pop_front() {
            let verdict = self.prepare(load);
            summary.add(self.apply(verdict));
        }
        if summary != BatchSummary::default() {
            log::debug!("Replayed queued loads: {:?}", summary);
        }
        summary
    }

    fn enforce(&mut self, load: &ResourceLoad, decision: &Decision) -> Enforcement {
        match decision {
            Decision::Allow => {
                self.stats.record_allowed(load.resource_type);
                Enforcement::Allowed
            }
            Decision::Block { tracker_domain } => {
                self.prevent(load);
                self.stats.record_blocked(tracker_domain, load.resource_type);
                Enforcement::Blocked
            }
            Decision::Replace {
                tracker_domain,
                surrogate,
            } => {
                // The surrogate must be in place before anything that
                // depended on the blocked script runs.
                let injected = match self.host.run_script(surrogate.replacement_source()) {
                    Ok(()) => true,
                    Err(e) => {
                        self.host_failures += 1;
                        log::warn!(
                            "Surrogate '{}' for {} failed to install: {}; keeping the load blocked",
                            surrogate.name(),
                            load.url,
                            e
                        );
                        false
                    }
                };

                self.prevent(load);
                if injected {
                    self.stats.record_replaced(tracker_domain, load.resource_type);
                    Enforcement::Replaced
                } else {
                    self.stats.record_blocked(tracker_domain, load.resource_type);
                    Enforcement::Blocked
                }
            }
        }
    }

    fn prevent(&mut self, load: &ResourceLoad) {
        let result = match load.origin {
            LoadOrigin::Network { request_id } => self.host.cancel_load(request_id),
            LoadOrigin::Element { node } => self.host.remove_node(node),
        };
        if let Err(e) = result {
            self.host_failures += 1;
            log::warn!("Failed to prevent load of {}: {}", load.url, e);
        }
    }
}
