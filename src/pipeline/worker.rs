use std::sync::Arc;

use arc_swap::ArcSwap;
use log::{debug, warn};

use super::{Pipeline, WaitOutcome};
use crate::dial::{Dialer, NodeClient};

/// Indirection between a connection worker and the pipeline it serves.
///
/// A reconfiguration re-points the handle at the successor pipeline, which
/// is how an established connection migrates across snapshots without a
/// reconnect.
pub(crate) struct WorkerHandle {
    target: ArcSwap<Pipeline>,
}

impl WorkerHandle {
    pub(crate) fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            target: ArcSwap::from(pipeline),
        }
    }

    pub(crate) fn current(&self) -> Arc<Pipeline> {
        self.target.load_full()
    }

    pub(crate) fn retarget(&self, pipeline: Arc<Pipeline>) {
        self.target.store(pipeline);
    }
}

/// One connection worker: owns at most one node connection and executes the
/// pipeline's requests against it in order.
///
/// The worker survives reconfigurations that keep its address (the handle is
/// re-pointed) and exits when its pipeline closes for good.
pub(crate) async fn run_worker(handle: Arc<WorkerHandle>, dialer: Arc<Dialer>, lazy: bool) {
    let mut client: Option<NodeClient> = None;
    loop {
        let pipeline = handle.current();

        if client.is_none() && lazy {
            // defer the first dial until work is actually waiting
            if !pipeline.wait_until_nonempty().await {
                if Arc::ptr_eq(&handle.current(), &pipeline) {
                    break;
                }
                continue;
            }
        }

        let mut conn = match client.take() {
            Some(conn) => conn,
            None => match acquire_connection(&pipeline, &dialer).await {
                Some(conn) => conn,
                None => {
                    // pipeline closed while dialing; follow a takeover or
                    // exit
                    if Arc::ptr_eq(&handle.current(), &pipeline) {
                        break;
                    }
                    continue;
                }
            },
        };

        match pipeline.wait_for_work().await {
            WaitOutcome::Request(request) => match conn.execute(&request).await {
                Ok(response) => {
                    request.complete(Ok(response));
                    client = Some(conn);
                }
                Err(err) => {
                    warn!(
                        "request {} failed on {}: {}",
                        request.id(),
                        conn.address(),
                        err
                    );
                    request.complete(Err(err));
                    // the connection is suspect after a transport failure;
                    // it is dropped here and the next round redials
                }
            },
            WaitOutcome::Closed => {
                client = Some(conn);
                if Arc::ptr_eq(&handle.current(), &pipeline) {
                    debug!("connection worker for {} shutting down", pipeline.address());
                    break;
                }
                // re-pointed by a takeover: keep the connection and continue
                // on the successor pipeline
            }
        }
    }
}

/// Dial until a connection is up or the pipeline goes away. Backoff pacing
/// lives inside the dialer.
async fn acquire_connection(pipeline: &Arc<Pipeline>, dialer: &Dialer) -> Option<NodeClient> {
    loop {
        if pipeline.is_closed() {
            return None;
        }
        match dialer.dial_with_backoff(pipeline.address()).await {
            Ok(client) => return Some(client),
            Err(err) => debug!("dial {} failed: {}", pipeline.address(), err),
        }
    }
}
