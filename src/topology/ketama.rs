use crate::core::{Result, RoutingError};

const POINTS_PER_SERVER: u32 = 160;

/// Consistent-hash ring mapping keys directly to server indices.
///
/// Each server contributes a fixed number of points; a key resolves to the
/// owner of the first point at or clockwise of its hash. Membership changes
/// therefore move only the keys between the departed server's points and
/// their predecessors.
#[derive(Debug)]
pub struct KetamaRing {
    points: Vec<(u64, usize)>,
    num_servers: usize,
}

impl KetamaRing {
    pub fn new(servers: &[String]) -> Result<Self> {
        if servers.is_empty() {
            return Err(RoutingError::InvalidConfig(
                "consistent-hash ring needs at least one server".to_string(),
            ));
        }
        let mut points = Vec::with_capacity(servers.len() * POINTS_PER_SERVER as usize);
        for (index, server) in servers.iter().enumerate() {
            for repetition in 0..POINTS_PER_SERVER {
                let label = format!("{server}-{repetition}");
                points.push((fnv1a(label.as_bytes()), index));
            }
        }
        points.sort_unstable();
        Ok(Self {
            points,
            num_servers: servers.len(),
        })
    }

    pub fn num_servers(&self) -> usize {
        self.num_servers
    }

    /// Resolve a key to the server index owning it.
    pub fn node_for_key(&self, key: &[u8]) -> Result<usize> {
        if self.points.is_empty() {
            return Err(RoutingError::Internal(
                "consistent-hash ring has no points".to_string(),
            ));
        }
        let hash = fnv1a(key);
        let position = self.points.partition_point(|&(point, _)| point < hash);
        let (_, index) = self.points[position % self.points.len()];
        Ok(index)
    }
}

// Stable FNV-1a over the input bytes; ring placement only needs determinism
// and a reasonable spread.
fn fnv1a(data: &[u8]) -> u64 {
    let mut hash = 14695981039346656037u64;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}
