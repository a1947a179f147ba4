use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};

use crate::core::{Result, RoutingError};

/// One entry of the versioned KV error map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMapEntry {
    pub name: String,
    pub desc: String,
    #[serde(default)]
    pub attrs: Vec<String>,
}

/// Versioned error-map document fetched from a node after negotiation.
///
/// Codes are keyed by their lower-case hex representation, matching the wire
/// document format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvErrorMap {
    pub version: u32,
    pub revision: i64,
    #[serde(default)]
    pub errors: HashMap<String, ErrorMapEntry>,
}

impl KvErrorMap {
    pub fn parse(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| RoutingError::Internal(e.to_string()))
    }

    pub fn lookup(&self, code: u16) -> Option<&ErrorMapEntry> {
        self.errors.get(&format!("{code:x}"))
    }
}

/// Agent-wide error map shared across every connection.
///
/// Upgrades are monotonic by revision: a fetched map replaces the installed
/// one only when it is at least as new, and lost publication races retry
/// until either the candidate is in or something newer is.
#[derive(Default)]
pub struct SharedErrorMap {
    current: ArcSwapOption<KvErrorMap>,
}

impl SharedErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<KvErrorMap>> {
        self.current.load_full()
    }

    pub fn upgrade(&self, candidate: Arc<KvErrorMap>) {
        loop {
            let installed = self.current.load();
            if let Some(current) = installed.as_ref() {
                if candidate.revision < current.revision {
                    return;
                }
            }
            let previous = self
                .current
                .compare_and_swap(&installed, Some(Arc::clone(&candidate)));
            if same_map(&previous, &installed) {
                return;
            }
        }
    }
}

fn same_map(a: &Option<Arc<KvErrorMap>>, b: &Option<Arc<KvErrorMap>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(revision: i64) -> Arc<KvErrorMap> {
        Arc::new(KvErrorMap {
            version: 1,
            revision,
            errors: HashMap::new(),
        })
    }

    #[test]
    fn parses_wire_document() {
        let raw = br#"{
            "version": 1,
            "revision": 4,
            "errors": {
                "1": {"name": "KEY_ENOENT", "desc": "key not found"},
                "7": {"name": "NOT_MY_VBUCKET", "desc": "moved", "attrs": ["fetch-config"]}
            }
        }"#;
        let parsed = KvErrorMap::parse(raw).unwrap();
        assert_eq!(parsed.revision, 4);
        assert_eq!(parsed.lookup(0x1).unwrap().name, "KEY_ENOENT");
        assert_eq!(parsed.lookup(0x7).unwrap().attrs, vec!["fetch-config"]);
        assert!(parsed.lookup(0xff).is_none());
    }

    #[test]
    fn garbage_fails_to_parse() {
        assert!(KvErrorMap::parse(b"not-json").is_err());
    }

    #[test]
    fn upgrade_is_monotonic() {
        let shared = SharedErrorMap::new();
        assert!(shared.get().is_none());

        shared.upgrade(map(3));
        assert_eq!(shared.get().unwrap().revision, 3);

        // older revision never replaces a newer one
        shared.upgrade(map(2));
        assert_eq!(shared.get().unwrap().revision, 3);

        // same revision is accepted
        let same = map(3);
        shared.upgrade(Arc::clone(&same));
        assert!(Arc::ptr_eq(&shared.get().unwrap(), &same));

        shared.upgrade(map(9));
        assert_eq!(shared.get().unwrap().revision, 9);
    }
}
