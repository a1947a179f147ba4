use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use uuid::Uuid;

use super::{Authenticator, FailureTracker, NodeClient, TlsOptions, Transport, WireProtocol};
use crate::agent::AgentConfig;
use crate::core::{HelloFeature, Result};
use crate::errmap::{KvErrorMap, SharedErrorMap};

/// Error map version requested from nodes that negotiated support.
const ERROR_MAP_VERSION: u32 = 1;

/// Opens and bootstraps single node connections: transport connect,
/// capability negotiation, error-map fetch, authentication. Backoff against
/// persistently failing nodes is layered on via `dial_with_backoff`.
pub struct Dialer {
    client_id: String,
    tls: Option<TlsOptions>,
    connect_timeout: Duration,
    wait_interval: Duration,
    use_error_map: bool,
    use_mutation_tokens: bool,
    failures: Arc<FailureTracker>,
    shared_error_map: Arc<SharedErrorMap>,
    protocol: Arc<dyn WireProtocol>,
    authenticator: Arc<dyn Authenticator>,
}

impl Dialer {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        client_id: String,
        tls: Option<TlsOptions>,
        connect_timeout: Duration,
        wait_interval: Duration,
        use_error_map: bool,
        use_mutation_tokens: bool,
        failures: Arc<FailureTracker>,
        shared_error_map: Arc<SharedErrorMap>,
        protocol: Arc<dyn WireProtocol>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            client_id,
            tls,
            connect_timeout,
            wait_interval,
            use_error_map,
            use_mutation_tokens,
            failures,
            shared_error_map,
            protocol,
            authenticator,
        }
    }

    /// Standalone dialer with its own failure table and shared error map.
    /// The agent instead wires in its process-wide instances.
    pub fn from_config(
        config: &AgentConfig,
        protocol: Arc<dyn WireProtocol>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self::new(
            Uuid::new_v4().to_string(),
            config.tls.clone(),
            config.connect_timeout,
            config.dial_wait_interval,
            config.use_error_map,
            config.use_mutation_tokens,
            Arc::new(FailureTracker::new()),
            Arc::new(SharedErrorMap::new()),
            protocol,
            authenticator,
        )
    }

    pub fn failures(&self) -> &Arc<FailureTracker> {
        &self.failures
    }

    pub fn shared_error_map(&self) -> &Arc<SharedErrorMap> {
        &self.shared_error_map
    }

    /// Open, negotiate and authenticate one connection to `address`.
    pub async fn dial(&self, address: &str) -> Result<NodeClient> {
        let deadline = Instant::now() + self.connect_timeout;
        let mut transport = Transport::connect(address, self.tls.as_ref(), deadline).await?;

        let mut features = vec![
            HelloFeature::Tls,
            HelloFeature::Xattr,
            HelloFeature::SelectBucket,
        ];
        if self.use_error_map {
            features.push(HelloFeature::ErrorMap);
        }
        if self.use_mutation_tokens {
            features.push(HelloFeature::SeqNo);
        }

        debug!("negotiating features with {address}");
        let negotiated = match self
            .protocol
            .negotiate(&mut transport, &self.client_id, &features, deadline)
            .await
        {
            Ok(accepted) => accepted,
            Err(err) => {
                // unsupported features simply degrade to their absence;
                // only transport failures abort the dial
                debug!("feature negotiation with {address} failed: {err}");
                Vec::new()
            }
        };

        let mut error_map = None;
        if negotiated.contains(&HelloFeature::ErrorMap) {
            match self
                .protocol
                .fetch_error_map(&mut transport, ERROR_MAP_VERSION, deadline)
                .await
            {
                Ok(raw) => match KvErrorMap::parse(&raw) {
                    Ok(parsed) => {
                        let parsed = Arc::new(parsed);
                        debug!(
                            "fetched error map revision {} from {address}",
                            parsed.revision
                        );
                        error_map = Some(Arc::clone(&parsed));
                        self.shared_error_map.upgrade(parsed);
                    }
                    Err(err) => debug!("failed to parse error map from {address}: {err}"),
                },
                Err(err) => debug!("failed to fetch error map from {address}: {err}"),
            }
        }

        let mut client = NodeClient::new(
            address.to_string(),
            transport,
            negotiated,
            error_map,
            Arc::clone(&self.protocol),
        );

        debug!("authenticating against {address}");
        if let Err(err) = self.authenticator.authenticate(&mut client, deadline).await {
            debug!("authentication against {address} failed: {err}");
            if let Err(close_err) = client.shutdown().await {
                warn!("failed to close connection after auth error: {close_err}");
            }
            return Err(err);
        }

        Ok(client)
    }

    /// Dial, waiting out the remainder of the backoff interval since the
    /// address's last recorded failure. A failed dial records a fresh
    /// failure timestamp.
    pub async fn dial_with_backoff(&self, address: &str) -> Result<NodeClient> {
        if let Some(wait) = self.failures.remaining_wait(address, self.wait_interval) {
            debug!("throttling dial to {address} for {wait:?}");
            tokio::time::sleep(wait).await;
        }

        match self.dial(address).await {
            Ok(client) => Ok(client),
            Err(err) => {
                self.failures.record(address);
                Err(err)
            }
        }
    }
}
