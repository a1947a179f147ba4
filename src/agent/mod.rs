pub mod config;
pub mod routing;

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwapOption;
use log::info;
use uuid::Uuid;

use crate::core::{BucketType, Result, RoutingError};
use crate::dial::{Authenticator, Dialer, FailureTracker, WireProtocol};
use crate::errmap::{KvErrorMap, SharedErrorMap};
use crate::topology::TopologyDocument;

pub use config::AgentConfig;
pub use routing::RoutingSnapshot;

/// Process-wide holder of the published routing snapshot plus the shared
/// dial state.
///
/// Readers take the current snapshot with a lock-free load and never observe
/// a partially built one; installers serialize construction behind
/// `config_lock` and publish with a compare-and-swap, so the dispatch hot
/// path is never blocked by a reconfiguration.
pub struct Agent {
    client_id: String,
    config: AgentConfig,
    /// Fixed at bootstrap for the agent's lifetime; 0 for consistent-hash
    /// buckets. Documents disagreeing with it are rejected wholesale.
    num_vbuckets: u16,
    routing: ArcSwapOption<RoutingSnapshot>,
    config_lock: Mutex<()>,
    dialer: Arc<Dialer>,
    failures: Arc<FailureTracker>,
    shared_error_map: Arc<SharedErrorMap>,
    closed: AtomicBool,
}

impl Agent {
    /// Bootstrap an agent from its first topology document.
    ///
    /// This is the only entry point that installs routing into an empty
    /// agent; `update_topology` declines updates until it has run. The
    /// vbucket count observed here is fixed for the agent's lifetime.
    ///
    /// Connection workers are spawned onto the ambient tokio runtime; with
    /// `lazy_connect` they stay idle until work is queued.
    pub async fn bootstrap(
        config: AgentConfig,
        document: &TopologyDocument,
        protocol: Arc<dyn WireProtocol>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self> {
        config.validate()?;
        let route_config = document.normalize()?;
        let num_vbuckets = route_config
            .vb_map
            .as_ref()
            .map(|m| m.num_vbuckets())
            .unwrap_or(0);

        let client_id = Uuid::new_v4().to_string();
        let failures = Arc::new(FailureTracker::new());
        let shared_error_map = Arc::new(SharedErrorMap::new());
        let dialer = Arc::new(Dialer::new(
            client_id.clone(),
            config.tls.clone(),
            config.connect_timeout,
            config.dial_wait_interval,
            config.use_error_map,
            config.use_mutation_tokens,
            Arc::clone(&failures),
            Arc::clone(&shared_error_map),
            protocol,
            authenticator,
        ));

        let agent = Self {
            client_id,
            config,
            num_vbuckets,
            routing: ArcSwapOption::from(None),
            config_lock: Mutex::new(()),
            dialer,
            failures,
            shared_error_map,
            closed: AtomicBool::new(false),
        };

        let snapshot = Arc::new(agent.build_snapshot(route_config));
        info!(
            "agent {} bootstrapping with routing revision {} for bucket {}",
            agent.client_id,
            snapshot.rev(),
            snapshot.uuid()
        );
        agent.routing.store(Some(Arc::clone(&snapshot)));
        // a fresh set with no predecessor: start every pipeline per the
        // dial policy
        snapshot.pipelines().start();
        Ok(agent)
    }

    /// Identifier advertised during capability negotiation.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn num_vbuckets(&self) -> u16 {
        self.num_vbuckets
    }

    /// Lock-free read of the currently published snapshot.
    pub fn routing_snapshot(&self) -> Option<Arc<RoutingSnapshot>> {
        self.routing.load_full()
    }

    /// The best error map any connection has fetched so far.
    pub fn shared_error_map(&self) -> Option<Arc<KvErrorMap>> {
        self.shared_error_map.get()
    }

    pub fn failure_tracker(&self) -> &Arc<FailureTracker> {
        &self.failures
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Operator-facing view of the installed routing.
    pub fn routing_summary(&self) -> Option<RoutingSummary> {
        let snapshot = self.routing_snapshot()?;
        Some(RoutingSummary {
            rev: snapshot.rev(),
            uuid: snapshot.uuid().to_string(),
            bucket_type: snapshot.bucket_type(),
            num_pipelines: snapshot.pipelines().len(),
            queued_requests: snapshot.pipelines().queued_requests(),
        })
    }

    /// Tear the agent down: unpublish the routing so new dispatches fail
    /// with `Shutdown`, then fail everything still queued. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let previous = self.routing.swap(None);
        if let Some(snapshot) = previous {
            let drained = snapshot.pipelines().drain();
            info!(
                "agent {} closed; failing {} queued requests",
                self.client_id,
                drained.len()
            );
            for request in drained {
                request.complete(Err(RoutingError::Shutdown));
            }
        }
    }
}

/// Point-in-time summary of the installed routing.
#[derive(Debug, Clone)]
pub struct RoutingSummary {
    pub rev: i64,
    pub uuid: String,
    pub bucket_type: BucketType,
    pub num_pipelines: usize,
    pub queued_requests: usize,
}

impl fmt::Display for RoutingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rev {} bucket {} ({}): {} pipelines, {} queued",
            self.rev, self.uuid, self.bucket_type, self.num_pipelines, self.queued_requests
        )
    }
}
