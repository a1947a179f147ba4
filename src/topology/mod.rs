pub mod document;
pub mod ketama;
pub mod vbucket;

use std::sync::Arc;

use crate::core::BucketType;

pub use document::{TopologyDocument, TopologyNode, VbucketServerMap};
pub use ketama::KetamaRing;
pub use vbucket::VbucketMap;

/// A topology document normalized into the form routing works from.
///
/// Exactly one sharding table is populated, matching the bucket type. The
/// config is immutable once built; snapshots keep an `Arc` to it so a
/// refresh can reapply the same data.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub rev: i64,
    pub uuid: String,
    pub bucket_type: BucketType,
    pub kv_servers: Vec<String>,
    pub mgmt_endpoints: Vec<String>,
    pub views_endpoints: Vec<String>,
    pub query_endpoints: Vec<String>,
    pub search_endpoints: Vec<String>,
    pub vb_map: Option<Arc<VbucketMap>>,
    pub ketama: Option<Arc<KetamaRing>>,
}
