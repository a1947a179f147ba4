// ============================================================================
// kvroute Library
// ============================================================================

//! Client-side routing and connection layer for a distributed key-value
//! store driver.
//!
//! An external configuration fetcher feeds [`TopologyDocument`]s to the
//! [`Agent`]. The agent normalizes each document, builds an immutable
//! [`RoutingSnapshot`] (sharding tables plus a fresh [`PipelineSet`]) and
//! publishes it atomically; [`Agent::dispatch_direct`] reads whatever
//! snapshot is current and enqueues the request on the pipeline that owns
//! its key. Pipelines dial their node through the [`Dialer`], which
//! negotiates capabilities and authenticates via the [`WireProtocol`] and
//! [`Authenticator`] collaborators supplied at bootstrap.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use kvroute::{Agent, AgentConfig, KvRequest, NoopAuthenticator, TopologyDocument};
//!
//! # async fn demo(protocol: Arc<dyn kvroute::WireProtocol>) -> kvroute::Result<()> {
//! let document = TopologyDocument::from_json(br#"{
//!     "rev": 1,
//!     "uuid": "example-bucket",
//!     "bucket_type": "consistent-hash",
//!     "nodes": [{"kv_address": "10.0.0.1:11210"}, {"kv_address": "10.0.0.2:11210"}]
//! }"#)?;
//!
//! let agent = Agent::bootstrap(
//!     AgentConfig::new().lazy_connect(true),
//!     &document,
//!     protocol,
//!     Arc::new(NoopAuthenticator),
//! )
//! .await?;
//!
//! agent.dispatch_direct(KvRequest::new(
//!     Some(b"greeting".to_vec()),
//!     0,
//!     b"encoded-op".to_vec(),
//!     |result| println!("completed: {result:?}"),
//! ))?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod core;
pub mod dial;
pub mod errmap;
pub mod pipeline;
pub mod request;
pub mod topology;

// Re-export the main types for convenience
pub use crate::agent::{Agent, AgentConfig, RoutingSnapshot, RoutingSummary};
pub use crate::core::{BucketType, HelloFeature, Result, RoutingError, ServiceType};
pub use crate::dial::{
    Authenticator, Dialer, FailureTracker, NodeClient, NoopAuthenticator, TlsOptions, Transport,
    WireProtocol,
};
pub use crate::errmap::{ErrorMapEntry, KvErrorMap, SharedErrorMap};
pub use crate::pipeline::{Pipeline, PipelineSet, SendError};
pub use crate::request::{KvRequest, KvResponse};
pub use crate::topology::{
    KetamaRing, RouteConfig, TopologyDocument, TopologyNode, VbucketMap, VbucketServerMap,
};
