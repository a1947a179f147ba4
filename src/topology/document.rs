use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{KetamaRing, RouteConfig, VbucketMap};
use crate::core::{BucketType, Result, RoutingError};

/// One node entry in a topology document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyNode {
    /// host:port the KV service listens on.
    pub kv_address: String,
    #[serde(default)]
    pub mgmt_address: Option<String>,
    #[serde(default)]
    pub views_address: Option<String>,
    #[serde(default)]
    pub query_address: Option<String>,
    #[serde(default)]
    pub search_address: Option<String>,
}

/// The vbucket ownership table as shipped inside a topology document.
///
/// `entries[vbucket][replica]` is an index into the node list, or -1 when no
/// node currently owns that copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VbucketServerMap {
    pub num_replicas: u32,
    pub entries: Vec<Vec<i16>>,
}

/// A cluster topology as supplied by the external configuration fetcher.
///
/// Immutable once received. `rev` is monotonic within a bucket's lifetime;
/// revision 0 means the document is unversioned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyDocument {
    pub rev: i64,
    pub uuid: String,
    pub bucket_type: BucketType,
    pub nodes: Vec<TopologyNode>,
    #[serde(default)]
    pub vbucket_map: Option<VbucketServerMap>,
}

impl TopologyDocument {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| RoutingError::InvalidConfig(e.to_string()))
    }

    /// Normalize into a `RouteConfig`, validating structure.
    ///
    /// A document that cannot be normalized must never be routed on; callers
    /// treat the error as fatal for the whole agent.
    pub fn normalize(&self) -> Result<RouteConfig> {
        if self.nodes.is_empty() {
            return Err(RoutingError::InvalidConfig(
                "topology document has no nodes".to_string(),
            ));
        }

        let kv_servers: Vec<String> = self.nodes.iter().map(|n| n.kv_address.clone()).collect();
        if kv_servers.iter().any(|a| a.is_empty()) {
            return Err(RoutingError::InvalidConfig(
                "topology node with an empty kv address".to_string(),
            ));
        }

        let mut vb_map = None;
        let mut ketama = None;
        match self.bucket_type {
            BucketType::Sharded => {
                let map = self.vbucket_map.as_ref().ok_or_else(|| {
                    RoutingError::InvalidConfig(
                        "sharded bucket without a vbucket map".to_string(),
                    )
                })?;
                vb_map = Some(Arc::new(VbucketMap::new(
                    map.entries.clone(),
                    map.num_replicas,
                )?));
            }
            BucketType::ConsistentHash => {
                ketama = Some(Arc::new(KetamaRing::new(&kv_servers)?));
            }
        }

        Ok(RouteConfig {
            rev: self.rev,
            uuid: self.uuid.clone(),
            bucket_type: self.bucket_type,
            kv_servers,
            mgmt_endpoints: collect(&self.nodes, |n| n.mgmt_address.as_ref()),
            views_endpoints: collect(&self.nodes, |n| n.views_address.as_ref()),
            query_endpoints: collect(&self.nodes, |n| n.query_address.as_ref()),
            search_endpoints: collect(&self.nodes, |n| n.search_address.as_ref()),
            vb_map,
            ketama,
        })
    }
}

fn collect<'a>(
    nodes: &'a [TopologyNode],
    pick: impl Fn(&'a TopologyNode) -> Option<&'a String>,
) -> Vec<String> {
    nodes.iter().filter_map(pick).cloned().collect()
}
