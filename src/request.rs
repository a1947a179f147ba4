use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::core::Result;

/// Response to a completed request. The payload stays opaque to the routing
/// layer; decoding belongs to the wire protocol collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvResponse {
    pub status: u16,
    pub payload: Vec<u8>,
}

/// Completion callback, invoked exactly once with a response or an error.
pub type Callback = Box<dyn FnOnce(Result<KvResponse>) + Send + Sync + 'static>;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// A single outgoing operation.
///
/// A request is owned by exactly one pipeline at a time and terminates
/// through `complete`, which consumes it; the type system enforces the
/// exactly-once callback contract.
pub struct KvRequest {
    id: u64,
    /// Target key. Absent for broadcast/administrative operations that
    /// address an explicit server index.
    pub key: Option<Vec<u8>>,
    /// Negative values target an explicit server index (`-idx - 1`);
    /// non-negative values select the replica resolved via sharding.
    pub replica_index: i32,
    /// Resolved during routing for key-sharded buckets.
    pub vbucket: u16,
    /// Encoded operation frame, opaque to this layer.
    pub payload: Vec<u8>,
    submitted_at: Instant,
    callback: Callback,
}

impl KvRequest {
    pub fn new(
        key: Option<Vec<u8>>,
        replica_index: i32,
        payload: Vec<u8>,
        callback: impl FnOnce(Result<KvResponse>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            key,
            replica_index,
            vbucket: 0,
            payload,
            submitted_at: Instant::now(),
            callback: Box::new(callback),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Original submission time; drained requests are redispatched in this
    /// order across a topology flip.
    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    /// Consume the request, delivering its terminal result.
    pub fn complete(self, result: Result<KvResponse>) {
        (self.callback)(result);
    }
}

// Manual impl because the callback is not Debug.
impl fmt::Debug for KvRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvRequest")
            .field("id", &self.id)
            .field("replica_index", &self.replica_index)
            .field("vbucket", &self.vbucket)
            .finish_non_exhaustive()
    }
}
