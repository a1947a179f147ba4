// Shared helpers for the integration suites: a wire-protocol stub and
// topology document builders.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kvroute::{
    Agent, AgentConfig, BucketType, HelloFeature, KvRequest, KvResponse, NoopAuthenticator,
    Result, RoutingError, TopologyDocument, TopologyNode, Transport, VbucketServerMap,
    WireProtocol,
};

/// Wire-protocol stub: accepts whatever features are advertised, serves a
/// canned error map, and echoes request payloads without touching the
/// transport.
pub struct StubProtocol {
    error_map: Option<Vec<u8>>,
    fail_negotiation: bool,
    negotiations: AtomicUsize,
    executed: Mutex<Vec<u64>>,
}

impl StubProtocol {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            error_map: None,
            fail_negotiation: false,
            negotiations: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
        })
    }

    pub fn with_error_map(json: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            error_map: Some(json.to_vec()),
            fail_negotiation: false,
            negotiations: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_negotiation() -> Arc<Self> {
        Arc::new(Self {
            error_map: None,
            fail_negotiation: true,
            negotiations: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
        })
    }

    /// Number of negotiation exchanges, i.e. connections bootstrapped.
    pub fn negotiations(&self) -> usize {
        self.negotiations.load(Ordering::SeqCst)
    }

    /// Request ids in the order they were executed.
    pub fn executed_ids(&self) -> Vec<u64> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl WireProtocol for StubProtocol {
    async fn negotiate(
        &self,
        _transport: &mut Transport,
        _client_id: &str,
        features: &[HelloFeature],
        _deadline: Instant,
    ) -> Result<Vec<HelloFeature>> {
        self.negotiations.fetch_add(1, Ordering::SeqCst);
        if self.fail_negotiation {
            return Err(RoutingError::Io("negotiation rejected".to_string()));
        }
        Ok(features.to_vec())
    }

    async fn fetch_error_map(
        &self,
        _transport: &mut Transport,
        _version: u32,
        _deadline: Instant,
    ) -> Result<Vec<u8>> {
        self.error_map
            .clone()
            .ok_or_else(|| RoutingError::Io("no error map configured".to_string()))
    }

    async fn execute(&self, _transport: &mut Transport, request: &KvRequest) -> Result<KvResponse> {
        self.executed.lock().unwrap().push(request.id());
        Ok(KvResponse {
            status: 0,
            payload: request.payload.clone(),
        })
    }
}

pub fn nodes(addresses: &[&str]) -> Vec<TopologyNode> {
    addresses
        .iter()
        .map(|address| TopologyNode {
            kv_address: address.to_string(),
            mgmt_address: None,
            views_address: None,
            query_address: None,
            search_address: None,
        })
        .collect()
}

/// Sharded-bucket document with round-robin vbucket ownership and one
/// replica column.
pub fn sharded_document(rev: i64, addresses: &[&str], num_vbuckets: usize) -> TopologyDocument {
    let entries = (0..num_vbuckets)
        .map(|vb| {
            let active = (vb % addresses.len()) as i16;
            let replica = if addresses.len() > 1 {
                ((vb + 1) % addresses.len()) as i16
            } else {
                -1
            };
            vec![active, replica]
        })
        .collect();
    TopologyDocument {
        rev,
        uuid: "test-bucket".to_string(),
        bucket_type: BucketType::Sharded,
        nodes: nodes(addresses),
        vbucket_map: Some(VbucketServerMap {
            num_replicas: 1,
            entries,
        }),
    }
}

pub fn hash_document(rev: i64, addresses: &[&str]) -> TopologyDocument {
    TopologyDocument {
        rev,
        uuid: "test-bucket".to_string(),
        bucket_type: BucketType::ConsistentHash,
        nodes: nodes(addresses),
        vbucket_map: None,
    }
}

/// A listening socket plus its address; keep the listener alive so dials
/// succeed.
pub async fn live_address() -> (tokio::net::TcpListener, String) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    (listener, address)
}

/// Address that refuses connections immediately: bind an ephemeral port and
/// drop the listener.
pub async fn dead_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);
    address
}

pub async fn dead_addresses(count: usize) -> Vec<String> {
    let mut addresses = Vec::with_capacity(count);
    for _ in 0..count {
        addresses.push(dead_address().await);
    }
    addresses
}

/// Agent that never drains its queues: lazy connect, dead node addresses
/// and a long redial interval keep every dispatched request parked where
/// the test can see it.
pub async fn parked_agent(document: &TopologyDocument) -> Agent {
    Agent::bootstrap(
        AgentConfig::new()
            .lazy_connect(true)
            .dial_wait_interval(Duration::from_secs(120)),
        document,
        StubProtocol::new(),
        Arc::new(NoopAuthenticator),
    )
    .await
    .unwrap()
}

/// Collects completion-callback outcomes in invocation order.
#[derive(Clone, Default)]
pub struct CompletionLog {
    entries: Arc<Mutex<Vec<(&'static str, Result<KvResponse>)>>>,
}

impl CompletionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(
        &self,
        tag: &'static str,
    ) -> Box<dyn FnOnce(Result<KvResponse>) + Send + Sync + 'static> {
        let entries = Arc::clone(&self.entries);
        Box::new(move |result| entries.lock().unwrap().push((tag, result)))
    }

    pub fn tags(&self) -> Vec<&'static str> {
        self.entries.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn results(&self) -> Vec<(&'static str, Result<KvResponse>)> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}
