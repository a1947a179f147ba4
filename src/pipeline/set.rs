use std::sync::Arc;

use log::debug;

use super::{Pipeline, WorkerHandle, run_worker};
use crate::core::{Result, RoutingError};
use crate::dial::Dialer;
use crate::request::KvRequest;

/// The per-snapshot pool of pipelines, one per KV server address.
///
/// Built fresh for every routing snapshot; either started from scratch or
/// handed the predecessor set's connection workers during a
/// reconfiguration.
pub struct PipelineSet {
    pipelines: Vec<Arc<Pipeline>>,
    pool_size: usize,
    lazy_connect: bool,
    dialer: Arc<Dialer>,
}

impl PipelineSet {
    pub(crate) fn new(
        addresses: &[String],
        pool_size: usize,
        max_queue: usize,
        lazy_connect: bool,
        dialer: Arc<Dialer>,
    ) -> Self {
        let pipelines = addresses
            .iter()
            .map(|address| Arc::new(Pipeline::new(address.clone(), max_queue)))
            .collect();
        Self {
            pipelines,
            pool_size,
            lazy_connect,
            dialer,
        }
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Arc<Pipeline>> {
        self.pipelines
            .get(index)
            .cloned()
            .ok_or(RoutingError::InvalidServer(index))
    }

    /// Requests queued across every pipeline.
    pub fn queued_requests(&self) -> usize {
        self.pipelines.iter().map(|p| p.queued_len()).sum()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.pipelines.iter().map(|p| p.address())
    }

    fn find(&self, address: &str) -> Option<&Arc<Pipeline>> {
        self.pipelines.iter().find(|p| p.address() == address)
    }

    /// Spawn connection workers for every pipeline. Used for a fresh set
    /// with no predecessor to take over from.
    pub(crate) fn start(&self) {
        for pipeline in &self.pipelines {
            self.spawn_workers(pipeline);
        }
    }

    fn spawn_workers(&self, pipeline: &Arc<Pipeline>) {
        for _ in 0..self.pool_size {
            let handle = Arc::new(WorkerHandle::new(Arc::clone(pipeline)));
            pipeline.attach_worker(Arc::clone(&handle));
            tokio::spawn(run_worker(
                handle,
                Arc::clone(&self.dialer),
                self.lazy_connect,
            ));
        }
    }

    /// Adopt the predecessor's connection workers for every address that
    /// persists across the reconfiguration; spawn fresh workers for new
    /// addresses. Retired addresses keep their workers on the old set until
    /// its drain shuts them down.
    pub(crate) fn takeover(&self, old: &PipelineSet) {
        for pipeline in &self.pipelines {
            let adopted = match old.find(pipeline.address()) {
                Some(previous) => previous.detach_workers(),
                None => Vec::new(),
            };
            if adopted.is_empty() {
                self.spawn_workers(pipeline);
                continue;
            }
            debug!(
                "pipeline {} adopting {} connection workers",
                pipeline.address(),
                adopted.len()
            );
            for handle in adopted {
                handle.retarget(Arc::clone(pipeline));
                pipeline.attach_worker(handle);
            }
        }
    }

    /// Close every pipeline, collecting everything still queued. The caller
    /// decides the fate of the drained requests (redispatch or terminal
    /// failure).
    pub(crate) fn drain(&self) -> Vec<KvRequest> {
        self.pipelines
            .iter()
            .flat_map(|pipeline| pipeline.drain())
            .collect()
    }
}
