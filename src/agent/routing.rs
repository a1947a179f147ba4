use std::fmt;
use std::sync::Arc;

use log::{debug, error, info, warn};

use super::Agent;
use crate::core::{BucketType, Result, RoutingError, ServiceType};
use crate::pipeline::{Pipeline, PipelineSet, SendError};
use crate::request::KvRequest;
use crate::topology::{KetamaRing, RouteConfig, TopologyDocument, VbucketMap};

/// Immutable bundle of topology, sharding tables and pipelines, published
/// atomically.
///
/// A snapshot is fully constructed before it is published and never mutated
/// afterwards; readers borrow whatever snapshot was current at read time.
pub struct RoutingSnapshot {
    rev: i64,
    uuid: String,
    bucket_type: BucketType,
    mgmt_endpoints: Vec<String>,
    views_endpoints: Vec<String>,
    query_endpoints: Vec<String>,
    search_endpoints: Vec<String>,
    vb_map: Option<Arc<VbucketMap>>,
    ketama: Option<Arc<KetamaRing>>,
    pipelines: Arc<PipelineSet>,
    source: Arc<RouteConfig>,
}

impl RoutingSnapshot {
    pub fn rev(&self) -> i64 {
        self.rev
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn bucket_type(&self) -> BucketType {
        self.bucket_type
    }

    pub fn pipelines(&self) -> &PipelineSet {
        &self.pipelines
    }

    pub fn vb_map(&self) -> Option<&Arc<VbucketMap>> {
        self.vb_map.as_ref()
    }

    pub fn ketama(&self) -> Option<&Arc<KetamaRing>> {
        self.ketama.as_ref()
    }

    /// Endpoint list for a non-KV service class.
    pub fn endpoints(&self, service: ServiceType) -> &[String] {
        match service {
            ServiceType::Mgmt => &self.mgmt_endpoints,
            ServiceType::Views => &self.views_endpoints,
            ServiceType::Query => &self.query_endpoints,
            ServiceType::Search => &self.search_endpoints,
        }
    }

    /// The normalized config this snapshot was built from; reapplied on a
    /// refresh.
    pub fn source(&self) -> &Arc<RouteConfig> {
        &self.source
    }
}

impl fmt::Display for RoutingSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "revision {} (bucket {}, {})",
            self.rev, self.uuid, self.bucket_type
        )?;
        for (index, address) in self.pipelines.addresses().enumerate() {
            writeln!(f, "  {index}: {address}")?;
        }
        Ok(())
    }
}

fn same_snapshot(a: &Option<Arc<RoutingSnapshot>>, b: &Option<Arc<RoutingSnapshot>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl Agent {
    pub(super) fn build_snapshot(&self, config: RouteConfig) -> RoutingSnapshot {
        let pipelines = Arc::new(PipelineSet::new(
            &config.kv_servers,
            self.config.pool_size,
            self.config.max_queue_size,
            self.config.lazy_connect,
            Arc::clone(&self.dialer),
        ));
        let source = Arc::new(config);
        RoutingSnapshot {
            rev: source.rev,
            uuid: source.uuid.clone(),
            bucket_type: source.bucket_type,
            mgmt_endpoints: source.mgmt_endpoints.clone(),
            views_endpoints: source.views_endpoints.clone(),
            query_endpoints: source.query_endpoints.clone(),
            search_endpoints: source.search_endpoints.clone(),
            vb_map: source.vb_map.clone(),
            ketama: source.ketama.clone(),
            pipelines,
            source,
        }
    }

    /// Install a new routing snapshot built from `config`.
    ///
    /// Construction is serialized behind the config lock; publication is a
    /// compare-and-swap against the snapshot read at the start, so readers
    /// are never blocked. Stale and duplicate revisions are benign no-ops.
    /// The update path declines when no snapshot is installed yet;
    /// `bootstrap` is the explicit initial-install entry point.
    pub fn apply_route_config(&self, config: RouteConfig) {
        // the vbucket count is fixed for the agent's lifetime; a document
        // disagreeing with it is rejected wholesale
        if let Some(vb_map) = &config.vb_map {
            if vb_map.num_vbuckets() != self.num_vbuckets {
                error!(
                    "topology revision {} carries {} vbuckets but this agent is fixed at {}; ignoring",
                    config.rev,
                    vb_map.num_vbuckets(),
                    self.num_vbuckets
                );
                return;
            }
        }

        // only one installation computes at a time
        let _guard = self.config_lock.lock().unwrap();

        let snapshot = Arc::new(self.build_snapshot(config));

        let current = self.routing.load();
        let Some(current_snapshot) = current.as_ref() else {
            debug!(
                "no routing installed; declining topology update revision {}",
                snapshot.rev
            );
            return;
        };

        if snapshot.rev == 0 {
            debug!("unversioned topology data, installing");
        } else if snapshot.rev == current_snapshot.rev {
            debug!("ignoring topology with identical revision {}", snapshot.rev);
            return;
        } else if snapshot.rev < current_snapshot.rev {
            debug!(
                "ignoring stale topology revision {} (installed {})",
                snapshot.rev, current_snapshot.rev
            );
            return;
        }

        let previous = self
            .routing
            .compare_and_swap(&current, Some(Arc::clone(&snapshot)));
        if !same_snapshot(&previous, &current) {
            warn!(
                "a concurrent installer preempted revision {}; abandoning the update",
                snapshot.rev
            );
            return;
        }

        info!("installed routing revision {}", snapshot.rev);
        debug!("new routing:\n{snapshot}");

        // nodes that persist across the reconfiguration keep their
        // connections; then the retiring set is drained and its requests
        // resubmitted in original submission order
        snapshot.pipelines.takeover(&current_snapshot.pipelines);
        let mut drained = current_snapshot.pipelines.drain();
        drained.sort_by_key(|request| request.submitted_at());
        for request in drained {
            self.requeue_direct(request);
        }
    }

    /// Replace the installed topology with `document`, or refresh the
    /// current one when called without a document.
    ///
    /// A document that cannot be normalized closes the whole agent:
    /// misrouting data-bearing requests is worse than refusing service.
    ///
    /// Must run inside the agent's tokio runtime; pipelines for newly
    /// appearing nodes spawn their connection workers onto it.
    pub fn update_topology(&self, document: Option<&TopologyDocument>) {
        match document {
            None => {
                let Some(current) = self.routing_snapshot() else {
                    return;
                };
                self.apply_route_config(current.source().as_ref().clone());
            }
            Some(doc) => match doc.normalize() {
                Ok(config) => self.apply_route_config(config),
                Err(err) => {
                    error!("received an invalid topology document ({err}); closing agent");
                    self.close();
                }
            },
        }
    }

    /// Resolve a request to the pipeline that owns it under the currently
    /// published snapshot.
    ///
    /// For key-sharded buckets the request's vbucket is resolved here as a
    /// side effect.
    pub fn route_request(&self, request: &mut KvRequest) -> Result<Arc<Pipeline>> {
        let guard = self.routing.load();
        let Some(info) = guard.as_ref() else {
            return Err(RoutingError::Shutdown);
        };

        let replica = request.replica_index;
        let server_index = if replica < 0 {
            // explicit server index, used by broadcast and administrative
            // operations that bypass sharding
            (-replica - 1) as usize
        } else {
            match info.bucket_type {
                BucketType::Sharded => {
                    let vb_map = info.vb_map.as_ref().ok_or_else(|| {
                        RoutingError::Internal(
                            "sharded bucket without a vbucket map".to_string(),
                        )
                    })?;
                    if let Some(key) = &request.key {
                        request.vbucket = vb_map.vbucket_for_key(key);
                    }
                    vb_map.node_for_vbucket(request.vbucket, replica as u32)?
                }
                BucketType::ConsistentHash => {
                    if replica > 0 {
                        return Err(RoutingError::InvalidReplica(replica));
                    }
                    let key = request.key.as_deref().unwrap_or_default();
                    if key.is_empty() {
                        return Err(RoutingError::Internal(
                            "keyless request on a key-addressed bucket".to_string(),
                        ));
                    }
                    let ring = info.ketama.as_ref().ok_or_else(|| {
                        RoutingError::Internal(
                            "consistent-hash bucket without a ring".to_string(),
                        )
                    })?;
                    ring.node_for_key(key)?
                }
            }
        };

        info.pipelines.get(server_index)
    }

    /// Route and enqueue a request.
    ///
    /// Completes in bounded time: a pipeline torn down by a concurrent
    /// reconfiguration triggers a re-route, a full pipeline is an immediate
    /// Overload. A terminal failure both completes the request's callback
    /// and is returned as the admission signal.
    pub fn dispatch_direct(&self, request: KvRequest) -> Result<()> {
        let mut request = request;
        loop {
            let pipeline = match self.route_request(&mut request) {
                Ok(pipeline) => pipeline,
                Err(err) => {
                    request.complete(Err(err.clone()));
                    return Err(err);
                }
            };
            match pipeline.send_request(request) {
                Ok(()) => return Ok(()),
                Err(SendError::Closed(returned)) => {
                    // the topology may have just changed; resolve again
                    request = returned;
                }
                Err(SendError::Full(returned)) => {
                    returned.complete(Err(RoutingError::Overload));
                    return Err(RoutingError::Overload);
                }
            }
        }
    }

    /// Re-route a request drained out of a retiring pipeline set.
    ///
    /// Runs off the reconfiguration path rather than the submitting
    /// caller's, so failures cannot be returned synchronously; anything but
    /// a pipeline-closed race terminates the request through its callback.
    /// Overload during a drain is terminal, not retried.
    pub fn requeue_direct(&self, request: KvRequest) {
        let mut request = request;
        loop {
            let pipeline = match self.route_request(&mut request) {
                Ok(pipeline) => pipeline,
                Err(err) => {
                    error!(
                        "reschedule failed, failing request {} ({err})",
                        request.id()
                    );
                    request.complete(Err(err));
                    return;
                }
            };
            match pipeline.requeue_request(request) {
                Ok(()) => return,
                Err(SendError::Closed(returned)) => {
                    request = returned;
                }
                Err(SendError::Full(returned)) => {
                    error!(
                        "reschedule overflowed pipeline {}, failing request {}",
                        pipeline.address(),
                        returned.id()
                    );
                    returned.complete(Err(RoutingError::Overload));
                    return;
                }
            }
        }
    }
}
