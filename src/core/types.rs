use serde::{Deserialize, Serialize};

/// How a bucket maps keys to servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BucketType {
    /// Keys hash to a fixed set of vbuckets; an ownership table maps each
    /// (vbucket, replica) pair to a server index.
    Sharded,
    /// Keys map straight to servers through a consistent-hash ring. No
    /// replica semantics.
    ConsistentHash,
}

impl std::fmt::Display for BucketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BucketType::Sharded => write!(f, "sharded"),
            BucketType::ConsistentHash => write!(f, "consistent-hash"),
        }
    }
}

/// Protocol capabilities negotiated once per connection.
///
/// `Tls`, `Xattr` and `SelectBucket` are always advertised; `ErrorMap` and
/// `SeqNo` only when the agent configuration asks for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloFeature {
    Tls,
    Xattr,
    SelectBucket,
    ErrorMap,
    SeqNo,
}

/// Non-KV service classes addressed through the topology's endpoint lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    Mgmt,
    Views,
    Query,
    Search,
}
