use crate::core::{Result, RoutingError};

/// Ownership table mapping (vbucket, replica) pairs to server indices.
///
/// The vbucket count is fixed for the lifetime of a bucket; documents that
/// change it are rejected wholesale upstream.
#[derive(Debug)]
pub struct VbucketMap {
    entries: Vec<Vec<i16>>,
    num_replicas: u32,
}

impl VbucketMap {
    pub fn new(entries: Vec<Vec<i16>>, num_replicas: u32) -> Result<Self> {
        if entries.is_empty() {
            return Err(RoutingError::InvalidConfig(
                "vbucket map has no entries".to_string(),
            ));
        }
        Ok(Self {
            entries,
            num_replicas,
        })
    }

    pub fn num_vbuckets(&self) -> u16 {
        self.entries.len() as u16
    }

    pub fn num_replicas(&self) -> u32 {
        self.num_replicas
    }

    /// Hash a key to its vbucket.
    pub fn vbucket_for_key(&self, key: &[u8]) -> u16 {
        let hash = (crc32(key) >> 16) & 0x7fff;
        (hash % self.entries.len() as u32) as u16
    }

    /// Resolve a (vbucket, replica) pair to a server index.
    ///
    /// Replica 0 is the active copy. Fails when the replica index exceeds
    /// the configured replication or when no node currently owns the copy.
    pub fn node_for_vbucket(&self, vbucket: u16, replica: u32) -> Result<usize> {
        let entry = self
            .entries
            .get(vbucket as usize)
            .ok_or(RoutingError::NoVbucketOwner { vbucket, replica })?;
        let index = *entry
            .get(replica as usize)
            .ok_or(RoutingError::InvalidReplica(replica as i32))?;
        if index < 0 {
            return Err(RoutingError::NoVbucketOwner { vbucket, replica });
        }
        Ok(index as usize)
    }
}

// CRC-32 (IEEE), computed bitwise. The ownership table's hashing contract
// only requires a stable, uniform key hash; the top half of the checksum
// folds onto the table size.
fn crc32(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xedb8_8320 & mask);
        }
    }
    !crc
}
