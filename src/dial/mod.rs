pub mod dialer;
pub mod failure;
pub mod transport;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::core::{HelloFeature, Result};
use crate::errmap::KvErrorMap;
use crate::request::{KvRequest, KvResponse};

pub use dialer::Dialer;
pub use failure::FailureTracker;
pub use transport::{TlsOptions, Transport};

/// Frame-level encoding and decoding of the KV protocol.
///
/// Supplied by the embedding driver. The routing layer orchestrates when
/// these exchanges happen but never interprets the bytes itself.
#[async_trait]
pub trait WireProtocol: Send + Sync {
    /// Advertise `features` on a fresh connection and return the set the
    /// server accepted.
    async fn negotiate(
        &self,
        transport: &mut Transport,
        client_id: &str,
        features: &[HelloFeature],
        deadline: Instant,
    ) -> Result<Vec<HelloFeature>>;

    /// Fetch the versioned error-map document from the node.
    async fn fetch_error_map(
        &self,
        transport: &mut Transport,
        version: u32,
        deadline: Instant,
    ) -> Result<Vec<u8>>;

    /// Execute one operation and decode its response.
    async fn execute(&self, transport: &mut Transport, request: &KvRequest) -> Result<KvResponse>;
}

/// Credential exchange against a freshly negotiated connection.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, client: &mut NodeClient, deadline: Instant) -> Result<()>;
}

/// Authenticator for clusters without credential exchange.
#[derive(Debug, Default)]
pub struct NoopAuthenticator;

#[async_trait]
impl Authenticator for NoopAuthenticator {
    async fn authenticate(&self, _client: &mut NodeClient, _deadline: Instant) -> Result<()> {
        Ok(())
    }
}

/// One negotiated, authenticated connection to a node.
pub struct NodeClient {
    address: String,
    transport: Transport,
    features: Vec<HelloFeature>,
    error_map: Option<Arc<KvErrorMap>>,
    protocol: Arc<dyn WireProtocol>,
}

impl NodeClient {
    pub(crate) fn new(
        address: String,
        transport: Transport,
        features: Vec<HelloFeature>,
        error_map: Option<Arc<KvErrorMap>>,
        protocol: Arc<dyn WireProtocol>,
    ) -> Self {
        Self {
            address,
            transport,
            features,
            error_map,
            protocol,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether the server accepted a feature during negotiation.
    pub fn supports(&self, feature: HelloFeature) -> bool {
        self.features.contains(&feature)
    }

    /// Error map attached at dial time, for local error decoding.
    pub fn error_map(&self) -> Option<&Arc<KvErrorMap>> {
        self.error_map.as_ref()
    }

    /// Raw transport access for collaborators that run their own exchanges
    /// (authentication, bucket selection).
    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    pub async fn execute(&mut self, request: &KvRequest) -> Result<KvResponse> {
        self.protocol.execute(&mut self.transport, request).await
    }

    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.transport.shutdown().await
    }
}

// Manual impl because the protocol handle and transport are not Debug.
impl std::fmt::Debug for NodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeClient")
            .field("address", &self.address)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}
